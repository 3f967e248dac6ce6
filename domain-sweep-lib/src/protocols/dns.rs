//! DNS stage of a probe attempt.
//!
//! Resolves A/AAAA records through hickory and reduces the answer to a
//! [`DnsEvidence`]. The resolver is built once per run and performs a single
//! query per lookup; retries belong to the prober.

use crate::types::DnsEvidence;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::error::ProtoErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::{debug, warn};

/// DNS lookups for candidate domains.
pub struct DnsProbe {
    resolver: TokioAsyncResolver,
    timeout: Duration,
    check_ns: bool,
}

impl DnsProbe {
    /// Build a resolver from the system configuration, falling back to the
    /// hickory defaults when it cannot be read.
    pub fn new(timeout: Duration, check_ns: bool) -> Self {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(system) => system,
            Err(e) => {
                warn!(error = %e, "could not read system resolver config, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
            check_ns,
        }
    }

    /// Look up `domain` and describe what came back.
    pub async fn lookup(&self, domain: &str) -> DnsEvidence {
        // Trailing dot keeps search domains out of the query
        let fqdn = format!("{}.", domain);

        let answer = tokio::time::timeout(self.timeout, self.resolver.lookup_ip(fqdn.as_str())).await;

        let evidence = match answer {
            Err(_) => DnsEvidence::TimedOut,
            Ok(Ok(lookup)) => {
                let addresses: Vec<_> = lookup.iter().collect();
                if addresses.is_empty() {
                    self.name_exists(&fqdn).await
                } else {
                    DnsEvidence::Resolved { addresses }
                }
            }
            Ok(Err(err)) => match classify_error(&err) {
                DnsEvidence::NoAddress { .. } => self.name_exists(&fqdn).await,
                other => other,
            },
        };

        debug!(domain, ?evidence, "dns stage finished");
        evidence
    }

    /// Evidence for a name that answered NOERROR without addresses.
    async fn name_exists(&self, fqdn: &str) -> DnsEvidence {
        let mut name_servers = Vec::new();
        if self.check_ns {
            if let Ok(Ok(lookup)) =
                tokio::time::timeout(self.timeout, self.resolver.ns_lookup(fqdn)).await
            {
                name_servers = lookup.iter().map(|ns| ns.to_string()).collect();
            }
        }
        DnsEvidence::NoAddress { name_servers }
    }
}

/// Map a resolver error onto the evidence it represents.
pub(crate) fn classify_error(err: &ResolveError) -> DnsEvidence {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NXDomain => DnsEvidence::NxDomain,
            ResponseCode::NoError => DnsEvidence::NoAddress {
                name_servers: Vec::new(),
            },
            code => DnsEvidence::Failed {
                reason: format!("server answered {}", code),
            },
        },
        ResolveErrorKind::Timeout => DnsEvidence::TimedOut,
        ResolveErrorKind::Proto(proto) if matches!(proto.kind(), ProtoErrorKind::Timeout) => {
            DnsEvidence::TimedOut
        }
        _ => DnsEvidence::Failed {
            reason: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_is_timed_out() {
        let err = ResolveError::from(ResolveErrorKind::Timeout);
        assert_eq!(classify_error(&err), DnsEvidence::TimedOut);
    }

    #[test]
    fn test_other_errors_are_failures() {
        let err = ResolveError::from("resolver exploded");
        match classify_error(&err) {
            DnsEvidence::Failed { reason } => assert!(reason.contains("resolver exploded")),
            other => panic!("unexpected evidence {:?}", other),
        }
    }
}
