//! HTTP stage of a probe attempt.
//!
//! Issues a single `HEAD http://<domain>/` without following redirects. Any
//! answer at all means something is serving the name.

use crate::error::ScanError;
use crate::types::HttpEvidence;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("domain-sweep/", env!("CARGO_PKG_VERSION"));

/// HEAD requests against candidate hosts.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                ScanError::network_with_source("Failed to create HTTP client", e.to_string())
            })?;

        Ok(Self { client })
    }

    pub async fn head(&self, domain: &str) -> HttpEvidence {
        let url = format!("http://{}/", domain);

        let evidence = match self.client.head(&url).send().await {
            Ok(response) => HttpEvidence::Status {
                code: response.status().as_u16(),
            },
            Err(e) => classify_error(&e),
        };

        debug!(domain, ?evidence, "http stage finished");
        evidence
    }
}

/// Map a request failure onto the evidence it represents.
///
/// Timeouts are checked first: a connect timeout reports both flags.
pub(crate) fn classify_error(err: &reqwest::Error) -> HttpEvidence {
    if err.is_timeout() {
        HttpEvidence::TimedOut
    } else if err.is_connect() {
        HttpEvidence::ConnectFailed {
            reason: err.to_string(),
        }
    } else {
        HttpEvidence::Failed {
            reason: err.to_string(),
        }
    }
}
