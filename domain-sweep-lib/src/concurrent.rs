//! Concurrent scanning with a fixed pool of workers.
//!
//! Workers are symmetric tokio tasks that pull from one shared
//! [`CandidateFeed`], probe through the shared [`AvailabilityProber`] (and
//! therefore the rate governor), hand the outcome to the [`ResultSink`] and
//! record it with the [`CheckpointManager`].
//!
//! Shared state sits behind two async mutexes. When both are needed they are
//! always taken in the same order: checkpoint manager first, then sink.

use crate::checkpoint::{CheckpointManager, CheckpointStorage};
use crate::error::ScanError;
use crate::generate::CandidateFeed;
use crate::prober::AvailabilityProber;
use crate::protocols::Probe;
use crate::sink::ResultSink;
use crate::types::ProbeOutcome;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a finished pool run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    /// Outcomes produced during this run
    pub probed: u64,
    /// The run stopped because of external cancellation
    pub cancelled: bool,
}

/// Fixed-size pool of scanning workers.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

struct Shared<P: Probe, S: CheckpointStorage> {
    feed: CandidateFeed,
    prober: Arc<AvailabilityProber<P>>,
    sink: Arc<Mutex<ResultSink>>,
    checkpoints: Arc<Mutex<CheckpointManager<S>>>,
    progress: Option<UnboundedSender<ProbeOutcome>>,
    halt: CancellationToken,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scan until the feed is exhausted or `cancel` fires.
    ///
    /// In-flight probes finish after cancellation; then one final checkpoint
    /// is forced. A persistence failure stops every worker and is returned
    /// without a final flush, leaving the last good checkpoint in place.
    pub async fn run<P, S>(
        &self,
        feed: CandidateFeed,
        prober: Arc<AvailabilityProber<P>>,
        sink: Arc<Mutex<ResultSink>>,
        checkpoints: Arc<Mutex<CheckpointManager<S>>>,
        progress: Option<UnboundedSender<ProbeOutcome>>,
        cancel: CancellationToken,
    ) -> Result<PoolSummary, ScanError>
    where
        P: Probe + 'static,
        S: CheckpointStorage + 'static,
    {
        let shared = Arc::new(Shared {
            feed,
            prober,
            sink,
            checkpoints,
            progress,
            halt: cancel.child_token(),
        });

        info!(workers = self.workers, remaining = shared.feed.remaining(), "starting workers");

        let handles: Vec<_> = (0..self.workers)
            .map(|id| tokio::spawn(worker_loop(id, shared.clone())))
            .collect();

        let mut probed = 0;
        let mut failure = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(count)) => probed += count,
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(ScanError::internal(format!("worker panicked: {}", e)));
                }
            }
        }

        if let Some(e) = failure {
            error!(error = %e, probed, "scan halted");
            return Err(e);
        }

        let checkpoints = shared.checkpoints.clone().lock_owned().await;
        let sink = shared.sink.clone().lock_owned().await;
        flush_blocking(checkpoints, sink).await?;

        let cancelled = cancel.is_cancelled();
        info!(probed, cancelled, "workers finished");
        Ok(PoolSummary { probed, cancelled })
    }
}

async fn worker_loop<P, S>(id: usize, shared: Arc<Shared<P, S>>) -> Result<u64, ScanError>
where
    P: Probe,
    S: CheckpointStorage + 'static,
{
    let mut probed = 0;

    while !shared.halt.is_cancelled() {
        let Some(candidate) = shared.feed.next_candidate() else {
            break;
        };

        let outcome = match shared.prober.probe(&candidate).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(domain = %candidate.domain, error = %e, "candidate rejected");
                ProbeOutcome::failed(candidate, &e, 0, Duration::ZERO)
            }
        };

        if let Err(e) = persist(&shared, &outcome).await {
            shared.halt.cancel();
            return Err(e);
        }

        if let Some(progress) = &shared.progress {
            // The receiver going away only stops progress reporting
            let _ = progress.send(outcome);
        }
        probed += 1;
    }

    debug!(worker = id, probed, "worker done");
    Ok(probed)
}

async fn persist<P, S>(shared: &Shared<P, S>, outcome: &ProbeOutcome) -> Result<(), ScanError>
where
    P: Probe,
    S: CheckpointStorage + 'static,
{
    shared.sink.lock().await.accept(outcome)?;

    let mut checkpoints = shared.checkpoints.clone().lock_owned().await;
    checkpoints.record(outcome);
    if checkpoints.flush_due() {
        // Another worker's flush failed: stop here, before touching any file
        checkpoints.check_failed()?;
        let sink = shared.sink.clone().lock_owned().await;
        flush_blocking(checkpoints, sink).await?;
    }
    Ok(())
}

/// Sync the result stores, then write a checkpoint, on the blocking pool.
///
/// Both guards move into the blocking task and are released there.
async fn flush_blocking<S>(
    checkpoints: OwnedMutexGuard<CheckpointManager<S>>,
    sink: OwnedMutexGuard<ResultSink>,
) -> Result<(), ScanError>
where
    S: CheckpointStorage + 'static,
{
    tokio::task::spawn_blocking(move || {
        let (mut checkpoints, mut sink) = (checkpoints, sink);
        sink.sync()?;
        checkpoints.flush().map(|_| ())
    })
    .await
    .map_err(|e| ScanError::internal(format!("checkpoint flush task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, FileCheckpointStorage, FlushPolicy, ScanSignature};
    use crate::generate::CandidateGenerator;
    use crate::governor::RateGovernor;
    use crate::types::{DnsEvidence, Evidence, GenerationMode, HttpEvidence, ScanConfig};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct AllAvailable;

    #[async_trait]
    impl Probe for AllAvailable {
        async fn attempt(&self, _domain: &str) -> Result<Evidence, ScanError> {
            Ok(Evidence::from_dns(DnsEvidence::NxDomain).with_http(HttpEvidence::ConnectFailed {
                reason: "refused".to_string(),
            }))
        }
    }

    fn config(dir: &TempDir) -> ScanConfig {
        ScanConfig::default()
            .with_mode(GenerationMode::Digits)
            .with_lengths(1, 1)
            .with_tlds([".im"])
            .with_workers(4)
            .with_delay(Duration::ZERO, Duration::ZERO)
            .with_checkpoint_every(3)
            .with_results_dir(dir.path())
    }

    #[tokio::test]
    async fn test_pool_drains_feed_and_flushes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let feed = CandidateFeed::new(vec![CandidateGenerator::new(&config, "im").unwrap()]);
        let governor = Arc::new(RateGovernor::from_config(&config));
        let prober = Arc::new(AvailabilityProber::new(AllAvailable, governor, 0));
        let sink = Arc::new(Mutex::new(ResultSink::from_config(&config).unwrap()));
        let checkpoints = Arc::new(Mutex::new(CheckpointManager::new(
            FileCheckpointStorage::for_config(&config),
            ScanSignature::from_config(&config),
            FlushPolicy::from_config(&config),
        )));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let summary = WorkerPool::new(config.workers)
            .run(
                feed,
                prober,
                sink,
                checkpoints.clone(),
                Some(tx),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.probed, 10);
        assert!(!summary.cancelled);

        let manager = checkpoints.lock().await;
        assert_eq!(manager.cursor("im"), 10);
        assert_eq!(manager.state().counts("im").available, 10);
        assert!(manager.sequence() >= 4);

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 10);
    }

    /// Notes which thread performed each checkpoint write.
    struct ThreadRecordingStorage {
        inner: FileCheckpointStorage,
        threads: Arc<std::sync::Mutex<Vec<std::thread::ThreadId>>>,
    }

    impl CheckpointStorage for ThreadRecordingStorage {
        fn read(&self) -> Result<Option<Checkpoint>, ScanError> {
            self.inner.read()
        }

        fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), ScanError> {
            self.threads
                .lock()
                .unwrap()
                .push(std::thread::current().id());
            self.inner.write(checkpoint)
        }

        fn location(&self) -> String {
            self.inner.location()
        }
    }

    #[tokio::test]
    async fn test_flushes_run_off_the_runtime_thread() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let threads = Arc::new(std::sync::Mutex::new(Vec::new()));

        let feed = CandidateFeed::new(vec![CandidateGenerator::new(&config, "im").unwrap()]);
        let governor = Arc::new(RateGovernor::from_config(&config));
        let prober = Arc::new(AvailabilityProber::new(AllAvailable, governor, 0));
        let sink = Arc::new(Mutex::new(ResultSink::from_config(&config).unwrap()));
        let checkpoints = Arc::new(Mutex::new(CheckpointManager::new(
            ThreadRecordingStorage {
                inner: FileCheckpointStorage::for_config(&config),
                threads: threads.clone(),
            },
            ScanSignature::from_config(&config),
            FlushPolicy::from_config(&config),
        )));

        WorkerPool::new(config.workers)
            .run(feed, prober, sink, checkpoints, None, CancellationToken::new())
            .await
            .unwrap();

        // The current-thread runtime lives on the test thread
        let runtime_thread = std::thread::current().id();
        let threads = threads.lock().unwrap();
        assert!(threads.len() >= 4);
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test]
    async fn test_cancelled_pool_pulls_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let feed = CandidateFeed::new(vec![CandidateGenerator::new(&config, "im").unwrap()]);
        let governor = Arc::new(RateGovernor::from_config(&config));
        let prober = Arc::new(AvailabilityProber::new(AllAvailable, governor, 0));
        let sink = Arc::new(Mutex::new(ResultSink::from_config(&config).unwrap()));
        let checkpoints = Arc::new(Mutex::new(CheckpointManager::new(
            FileCheckpointStorage::for_config(&config),
            ScanSignature::from_config(&config),
            FlushPolicy::from_config(&config),
        )));

        let summary = WorkerPool::new(2)
            .run(feed.clone(), prober, sink, checkpoints.clone(), None, cancel)
            .await
            .unwrap();

        assert_eq!(summary.probed, 0);
        assert!(summary.cancelled);
        assert_eq!(feed.remaining(), 10);
        // The final flush still runs
        assert_eq!(checkpoints.lock().await.sequence(), 1);
    }
}
