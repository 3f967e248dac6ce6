//! Verdict policy over DNS and HTTP evidence.
//!
//! A false "available" is the expensive mistake, so only an authoritative
//! NXDOMAIN backed by an unreachable web server is treated as available:
//!
//! | DNS (A/AAAA)              | HTTP                         | Decision    |
//! |---------------------------|------------------------------|-------------|
//! | addresses resolved        | any / not attempted          | Registered  |
//! | name exists, no addresses | any / not attempted          | Registered  |
//! | NXDOMAIN                  | not attempted                | probe HTTP  |
//! | NXDOMAIN                  | connection failed            | Available   |
//! | NXDOMAIN                  | any status                   | Registered  |
//! | NXDOMAIN                  | timeout / other failure      | retry       |
//! | timeout / failure         | not attempted                | probe HTTP  |
//! | timeout / failure         | any status                   | Registered  |
//! | timeout / failure         | any failure                  | retry       |
//!
//! Every status code counts as a live server, redirects and 4xx/5xx included.
//!
//! A DNS timeout or server failure is not retried on its own: the same attempt
//! moves on to HTTP, and an inconclusive pair retries the whole attempt.

use crate::types::{DnsEvidence, HttpEvidence, Verdict};

/// What to do next with the evidence gathered so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The evidence is conclusive
    Verdict(Verdict),
    /// DNS alone is not enough; ask the web server
    ProbeHttp,
    /// Nothing conclusive this attempt
    Retry,
}

/// Apply the policy table to one attempt's evidence.
pub fn classify(dns: &DnsEvidence, http: Option<&HttpEvidence>) -> Decision {
    match (dns, http) {
        (DnsEvidence::Resolved { .. } | DnsEvidence::NoAddress { .. }, _) => {
            Decision::Verdict(Verdict::Registered)
        }

        (_, Some(HttpEvidence::Status { .. })) => Decision::Verdict(Verdict::Registered),

        (DnsEvidence::NxDomain, None) => Decision::ProbeHttp,
        (DnsEvidence::NxDomain, Some(HttpEvidence::ConnectFailed { .. })) => {
            Decision::Verdict(Verdict::Available)
        }
        (DnsEvidence::NxDomain, Some(_)) => Decision::Retry,

        (DnsEvidence::TimedOut | DnsEvidence::Failed { .. }, None) => Decision::ProbeHttp,
        (DnsEvidence::TimedOut | DnsEvidence::Failed { .. }, Some(_)) => Decision::Retry,
    }
}

/// Whether a name that DNS already settled should still get an HTTP probe.
pub fn wants_http_evidence(dns: &DnsEvidence) -> bool {
    matches!(dns, DnsEvidence::Resolved { .. })
}
