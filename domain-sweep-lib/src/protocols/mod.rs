//! Probe implementations for domain availability.
//!
//! A probe performs one attempt against a domain: the DNS stage, followed by
//! the HTTP stage when the policy asks for it. Retries and pacing live in
//! [`crate::AvailabilityProber`].

/// DNS stage backed by hickory-resolver
pub mod dns;

/// HTTP stage backed by reqwest
pub mod http;

/// Verdict policy over the gathered evidence
pub mod policy;

pub use dns::DnsProbe;
pub use http::HttpProbe;
pub use policy::{classify, wants_http_evidence, Decision};

use crate::error::ScanError;
use crate::types::{Evidence, ScanConfig};
use async_trait::async_trait;

/// One probe attempt against one domain.
///
/// Transient network trouble should be reported inside the returned
/// [`Evidence`] or as a retryable [`ScanError`]; any other error ends the
/// retry loop for that candidate.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn attempt(&self, domain: &str) -> Result<Evidence, ScanError>;
}

/// Probe that talks to real DNS servers and web servers.
pub struct NetworkProbe {
    dns: DnsProbe,
    http: HttpProbe,
    http_evidence: bool,
}

impl NetworkProbe {
    pub fn new(dns: DnsProbe, http: HttpProbe, http_evidence: bool) -> Self {
        Self {
            dns,
            http,
            http_evidence,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        Ok(Self::new(
            DnsProbe::new(config.timeout, config.check_ns),
            HttpProbe::new(config.timeout)?,
            config.http_evidence,
        ))
    }
}

#[async_trait]
impl Probe for NetworkProbe {
    async fn attempt(&self, domain: &str) -> Result<Evidence, ScanError> {
        let dns = self.dns.lookup(domain).await;

        let needs_http = match classify(&dns, None) {
            Decision::ProbeHttp => true,
            Decision::Verdict(_) => self.http_evidence && wants_http_evidence(&dns),
            Decision::Retry => false,
        };

        let evidence = Evidence::from_dns(dns);
        if needs_http {
            let http = self.http.head(domain).await;
            Ok(evidence.with_http(http))
        } else {
            Ok(evidence)
        }
    }
}
