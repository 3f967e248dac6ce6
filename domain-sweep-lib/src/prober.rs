//! Retrying availability prober.
//!
//! Wraps a single-attempt [`Probe`] in the bounded retry loop. Every attempt
//! first takes a governor permit, so retries are paced exactly like fresh
//! candidates.

use crate::error::ScanError;
use crate::governor::RateGovernor;
use crate::protocols::{classify, Decision, Probe};
use crate::types::{Candidate, Evidence, ProbeOutcome, Verdict};
use crate::utils::validate_domain;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Turns one candidate into a [`ProbeOutcome`].
pub struct AvailabilityProber<P: Probe> {
    probe: P,
    governor: Arc<RateGovernor>,
    retries: u32,
}

impl<P: Probe> AvailabilityProber<P> {
    pub fn new(probe: P, governor: Arc<RateGovernor>, retries: u32) -> Self {
        Self {
            probe,
            governor,
            retries,
        }
    }

    /// Attempts made before giving up on a candidate.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Probe one candidate.
    ///
    /// Network trouble never surfaces as an error: it is retried and, once
    /// retries run out, reported as an `Uncertain` outcome. Only a malformed
    /// domain (or a closed governor) returns `Err`.
    pub async fn probe(&self, candidate: &Candidate) -> Result<ProbeOutcome, ScanError> {
        validate_domain(&candidate.domain)?;

        let domain = candidate.domain.as_str();
        let start = Instant::now();
        let max_attempts = self.max_attempts();
        let mut last = Evidence::default();

        for attempt in 1..=max_attempts {
            let permit = self.governor.acquire().await?;
            debug!(domain, attempt, "probe attempt");
            let result = self.probe.attempt(domain).await;
            self.governor.release(permit);

            match result {
                Ok(evidence) => {
                    let decision = evidence
                        .dns
                        .as_ref()
                        .map(|dns| classify(dns, evidence.http.as_ref()))
                        .unwrap_or(Decision::Retry);

                    if let Decision::Verdict(verdict) = decision {
                        return Ok(ProbeOutcome {
                            candidate: candidate.clone(),
                            verdict,
                            evidence,
                            attempts: attempt,
                            elapsed: start.elapsed(),
                        });
                    }
                    last = evidence;
                }
                Err(err) if err.is_retryable() => {
                    last = Evidence {
                        error: Some(err.to_string()),
                        ..Default::default()
                    };
                }
                Err(err) => {
                    warn!(domain, attempt, error = %err, "probe failed, not retrying");
                    return Ok(ProbeOutcome::failed(
                        candidate.clone(),
                        &err,
                        attempt,
                        start.elapsed(),
                    ));
                }
            }

            if attempt < max_attempts {
                warn!(domain, attempt, "inconclusive probe, retrying");
            }
        }

        if last.error.is_none() {
            last.error = Some(format!("no conclusive signal after {} attempts", max_attempts));
        }

        Ok(ProbeOutcome {
            candidate: candidate.clone(),
            verdict: Verdict::Uncertain,
            evidence: last,
            attempts: max_attempts,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DnsEvidence, HttpEvidence};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed list of attempt results, repeating the last one.
    struct Replay {
        script: Mutex<VecDeque<Result<Evidence, ScanError>>>,
        calls: AtomicU32,
    }

    impl Replay {
        fn new(script: Vec<Result<Evidence, ScanError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for Replay {
        async fn attempt(&self, _domain: &str) -> Result<Evidence, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn prober(script: Vec<Result<Evidence, ScanError>>, retries: u32) -> AvailabilityProber<Replay> {
        let governor = Arc::new(RateGovernor::new(1, Duration::ZERO, Duration::ZERO));
        AvailabilityProber::new(Replay::new(script), governor, retries)
    }

    fn candidate(domain: &str) -> Candidate {
        Candidate {
            tld: "im".to_string(),
            index: 0,
            domain: domain.to_string(),
        }
    }

    fn nx_refused() -> Evidence {
        Evidence::from_dns(DnsEvidence::NxDomain).with_http(HttpEvidence::ConnectFailed {
            reason: "refused".to_string(),
        })
    }

    #[tokio::test]
    async fn test_conclusive_first_attempt() {
        let prober = prober(vec![Ok(nx_refused())], 2);
        let outcome = prober.probe(&candidate("ab.im")).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Available);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(prober.probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_to_uncertain() {
        let prober = prober(vec![Err(ScanError::network("connection reset"))], 2);
        let outcome = prober.probe(&candidate("ab.im")).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Uncertain);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.evidence.error.unwrap().contains("connection reset"));
        assert_eq!(prober.probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_then_conclusive() {
        let timed_out = Evidence::from_dns(DnsEvidence::TimedOut).with_http(HttpEvidence::TimedOut);
        let prober = prober(vec![Ok(timed_out), Ok(nx_refused())], 2);
        let outcome = prober.probe(&candidate("ab.im")).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Available);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_inconclusive_evidence_is_kept() {
        let flaky = Evidence::from_dns(DnsEvidence::NxDomain).with_http(HttpEvidence::TimedOut);
        let prober = prober(vec![Ok(flaky.clone())], 1);
        let outcome = prober.probe(&candidate("ab.im")).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Uncertain);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.evidence.dns, flaky.dns);
        assert!(outcome.evidence.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_retry_waits_for_the_governor() {
        let governor = Arc::new(RateGovernor::new(
            1,
            Duration::from_millis(100),
            Duration::from_millis(100),
        ));
        let prober = AvailabilityProber::new(
            Replay::new(vec![Err(ScanError::network("connection reset"))]),
            governor.clone(),
            2,
        );

        let start = tokio::time::Instant::now();
        let outcome = prober.probe(&candidate("ab.im")).await.unwrap();
        let waited = start.elapsed();

        assert_eq!(outcome.attempts, 3);
        // One pacing delay per attempt, retries included
        assert!(waited >= Duration::from_millis(300), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(400), "waited {:?}", waited);
        assert_eq!(governor.available(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let prober = prober(vec![Err(ScanError::internal("broken probe"))], 5);
        let outcome = prober.probe(&candidate("ab.im")).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Uncertain);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_malformed_domain_rejected_before_probing() {
        let prober = prober(vec![Ok(nx_refused())], 2);
        let result = prober.probe(&candidate("-ab.im")).await;
        assert!(matches!(result, Err(ScanError::InvalidDomain { .. })));
        assert_eq!(prober.probe.calls.load(Ordering::SeqCst), 0);
    }
}
