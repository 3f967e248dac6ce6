//! Rate governing for probe attempts.
//!
//! The governor combines a hard concurrency ceiling with a randomized pause
//! taken after each permit is granted. Every probe attempt, retries included,
//! goes through [`RateGovernor::acquire`].

use crate::error::ScanError;
use crate::types::ScanConfig;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Shared pacing for one scan run.
#[derive(Debug)]
pub struct RateGovernor {
    permits: Arc<Semaphore>,
    ceiling: usize,
    delay_min: Duration,
    delay_max: Duration,
}

/// Scoped right to issue one probe attempt.
///
/// Dropping the permit releases it.
#[derive(Debug)]
pub struct GovernorPermit {
    _permit: OwnedSemaphorePermit,
    /// Pacing delay that was applied before the permit was handed out
    pub delay: Duration,
}

impl RateGovernor {
    /// Create a governor allowing `ceiling` concurrent attempts, each preceded
    /// by a pause drawn uniformly from `[delay_min, delay_max]`.
    pub fn new(ceiling: usize, delay_min: Duration, delay_max: Duration) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            permits: Arc::new(Semaphore::new(ceiling)),
            ceiling,
            delay_min: delay_min.min(delay_max),
            delay_max,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.workers, config.delay_min, config.delay_max)
    }

    /// Wait for a free slot, then for the pacing delay.
    pub async fn acquire(&self) -> Result<GovernorPermit, ScanError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScanError::internal("rate governor was closed"))?;

        let delay = self.sample_delay();
        trace!(delay_ms = delay.as_millis() as u64, "governor permit granted");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(GovernorPermit {
            _permit: permit,
            delay,
        })
    }

    /// Give a permit back before it goes out of scope.
    pub fn release(&self, permit: GovernorPermit) {
        drop(permit);
    }

    /// Concurrency ceiling.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    fn sample_delay(&self) -> Duration {
        let min = self.delay_min.as_millis() as u64;
        let max = self.delay_max.as_millis() as u64;
        if min >= max {
            return self.delay_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
