//! High-level scan orchestration.
//!
//! [`DomainScanner`] is the entry point most callers want: it validates a
//! [`ScanConfig`], resumes from a matching checkpoint, wires the generator,
//! governor, prober, sink and checkpoint manager together and runs the
//! worker pool.

use crate::checkpoint::{
    CheckpointManager, CheckpointStorage, FileCheckpointStorage, FlushPolicy, ScanSignature,
    ScanState,
};
use crate::concurrent::WorkerPool;
use crate::error::ScanError;
use crate::generate::{CandidateFeed, CandidateGenerator};
use crate::governor::RateGovernor;
use crate::prober::AvailabilityProber;
use crate::protocols::{NetworkProbe, Probe};
use crate::sink::ResultSink;
use crate::types::{Candidate, ProbeOutcome, ScanConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Result of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// State as of the final checkpoint
    pub state: ScanState,
    /// Candidates per TLD in the full sequence
    pub planned: BTreeMap<String, u64>,
    /// Outcomes produced by this run (resumed progress excluded)
    pub probed: u64,
    pub cancelled: bool,
    /// The run continued from an earlier checkpoint
    pub resumed: bool,
    /// Sequence number of the final checkpoint
    pub sequence: u64,
    pub checkpoint: PathBuf,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl ScanReport {
    /// Every planned candidate has an outcome.
    pub fn is_complete(&self) -> bool {
        self.planned
            .iter()
            .all(|(tld, total)| self.state.cursor(tld) >= *total)
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Runs availability sweeps for one configuration.
pub struct DomainScanner {
    config: ScanConfig,
    tlds: Vec<String>,
}

impl DomainScanner {
    /// Create a scanner, rejecting invalid configurations up front.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let tlds = config.normalized_tlds();
        Ok(Self { config, tlds })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Normalized TLDs in scan order.
    pub fn tlds(&self) -> &[String] {
        &self.tlds
    }

    pub fn signature(&self) -> ScanSignature {
        ScanSignature::from_config(&self.config)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        FileCheckpointStorage::for_config(&self.config)
            .path()
            .to_path_buf()
    }

    /// One generator per TLD, each positioned at its cursor in `state`.
    pub fn generators(&self, state: Option<&ScanState>) -> Result<Vec<CandidateGenerator>, ScanError> {
        self.tlds
            .iter()
            .map(|tld| -> Result<CandidateGenerator, ScanError> {
                let cursor = state.map(|s| s.cursor(tld)).unwrap_or(0);
                Ok(CandidateGenerator::new(&self.config, tld)?.resume_from(cursor))
            })
            .collect()
    }

    /// Candidates per TLD in the full sequence.
    pub fn planned(&self) -> Result<BTreeMap<String, u64>, ScanError> {
        Ok(self
            .generators(None)?
            .iter()
            .map(|g| (g.tld().to_string(), g.total()))
            .collect())
    }

    /// The candidates a fresh run would probe, without touching the network.
    pub fn dry_run(&self) -> Result<impl Iterator<Item = Candidate>, ScanError> {
        Ok(self.generators(None)?.into_iter().flatten())
    }

    /// The stored progress for this configuration, if any.
    pub fn load_state(&self) -> Result<Option<ScanState>, ScanError> {
        let mut manager = CheckpointManager::new(
            FileCheckpointStorage::for_config(&self.config),
            self.signature(),
            FlushPolicy::from_config(&self.config),
        );
        manager.load()
    }

    /// Scan against real DNS and web servers.
    pub async fn run(
        &self,
        progress: Option<UnboundedSender<ProbeOutcome>>,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let probe = NetworkProbe::from_config(&self.config)?;
        self.run_with_probe(probe, progress, cancel).await
    }

    /// Scan with a custom probe, checkpointing to the results directory.
    pub async fn run_with_probe<P: Probe + 'static>(
        &self,
        probe: P,
        progress: Option<UnboundedSender<ProbeOutcome>>,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let storage = FileCheckpointStorage::for_config(&self.config);
        let location = storage.path().to_path_buf();
        self.run_with_storage(probe, storage, location, progress, cancel)
            .await
    }

    /// Scan with a custom probe and checkpoint storage.
    pub async fn run_with_storage<P, S>(
        &self,
        probe: P,
        storage: S,
        location: PathBuf,
        progress: Option<UnboundedSender<ProbeOutcome>>,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ScanError>
    where
        P: Probe + 'static,
        S: CheckpointStorage + 'static,
    {
        let start = Instant::now();
        let mut manager = CheckpointManager::new(
            storage,
            self.signature(),
            FlushPolicy::from_config(&self.config),
        );

        let resumed = if self.config.resume {
            manager.load()?.is_some()
        } else {
            info!("ignoring any existing checkpoint");
            false
        };

        let planned = self.planned()?;
        let feed = CandidateFeed::new(self.generators(Some(manager.state()))?);
        let sink = ResultSink::from_config(&self.config)?;
        let governor = Arc::new(RateGovernor::from_config(&self.config));
        let prober = Arc::new(AvailabilityProber::new(probe, governor, self.config.retries));

        let checkpoints = Arc::new(Mutex::new(manager));
        let summary = WorkerPool::new(self.config.workers)
            .run(
                feed,
                prober,
                Arc::new(Mutex::new(sink)),
                checkpoints.clone(),
                progress,
                cancel,
            )
            .await?;

        let manager = checkpoints.lock().await;
        let report = ScanReport {
            state: manager.state().clone(),
            planned,
            probed: summary.probed,
            cancelled: summary.cancelled,
            resumed,
            sequence: manager.sequence(),
            checkpoint: location,
            elapsed: start.elapsed(),
        };

        let totals = report.state.totals();
        info!(
            probed = report.probed,
            available = totals.available,
            registered = totals.registered,
            uncertain = totals.uncertain,
            complete = report.is_complete(),
            "scan finished"
        );
        Ok(report)
    }
}
