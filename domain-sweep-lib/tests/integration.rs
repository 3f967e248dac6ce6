// domain-sweep-lib/tests/integration.rs

//! Integration tests for the scanning engine, driven by scripted probes.

use async_trait::async_trait;
use domain_sweep_lib::{
    CandidateGenerator, Checkpoint, CheckpointStorage, DnsEvidence, DomainScanner, Evidence,
    FileCheckpointStorage, GenerationMode, HttpEvidence, Probe, ProbeOutcome, ScanConfig,
    ScanError, Verdict,
};
use std::collections::BTreeSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Deterministic stand-in for the network.
///
/// Labels with an even byte sum look unregistered, odd ones resolve.
/// `ab.im` never gets a conclusive answer.
#[derive(Default)]
struct ScriptedProbe {
    calls: AtomicUsize,
    cancel_at: Option<(usize, CancellationToken)>,
    jitter: bool,
}

impl ScriptedProbe {
    fn cancelling_at(calls: usize, token: CancellationToken) -> Self {
        Self {
            cancel_at: Some((calls, token)),
            ..Default::default()
        }
    }

    fn jittery() -> Self {
        Self {
            jitter: true,
            ..Default::default()
        }
    }
}

fn expected_verdict(domain: &str) -> Verdict {
    let label = domain.split('.').next().unwrap_or_default();
    if label.bytes().map(u32::from).sum::<u32>() % 2 == 0 {
        Verdict::Available
    } else {
        Verdict::Registered
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn attempt(&self, domain: &str) -> Result<Evidence, ScanError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_at {
            if call >= *at {
                token.cancel();
            }
        }
        if self.jitter {
            let wait = domain.bytes().map(u64::from).sum::<u64>() % 7;
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }

        if domain == "ab.im" {
            return Err(ScanError::network("connection reset by peer"));
        }

        Ok(match expected_verdict(domain) {
            Verdict::Available => {
                Evidence::from_dns(DnsEvidence::NxDomain).with_http(HttpEvidence::ConnectFailed {
                    reason: "connection refused".to_string(),
                })
            }
            _ => Evidence::from_dns(DnsEvidence::Resolved {
                addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7))],
            }),
        })
    }
}

fn digits_config(dir: &Path) -> ScanConfig {
    ScanConfig::default()
        .with_mode(GenerationMode::Digits)
        .with_lengths(2, 2)
        .with_tlds([".im"])
        .with_workers(3)
        .with_delay(Duration::ZERO, Duration::ZERO)
        .with_retries(2)
        .with_checkpoint_every(10)
        .with_results_dir(dir)
}

fn read_store(dir: &Path, name: &str) -> Vec<String> {
    fs::read_to_string(dir.join(name))
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn store_sets(dir: &Path) -> [BTreeSet<String>; 3] {
    Verdict::ALL.map(|verdict| {
        read_store(dir, &format!("im_{}.txt", verdict.category()))
            .into_iter()
            .collect()
    })
}

#[tokio::test]
async fn test_limit_scenario_yields_exact_outcomes() {
    let dir = TempDir::new().unwrap();
    let config = digits_config(dir.path()).with_limit(5);
    let scanner = DomainScanner::new(config).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProbeOutcome>();

    let report = tokio_test::assert_ok!(
        scanner
            .run_with_probe(ScriptedProbe::default(), Some(tx), CancellationToken::new())
            .await
    );

    let mut outcomes = Vec::new();
    while let Ok(outcome) = rx.try_recv() {
        outcomes.push(outcome);
    }
    let domains: BTreeSet<_> = outcomes.iter().map(|o| o.domain().to_string()).collect();
    assert_eq!(outcomes.len(), 5);
    assert_eq!(
        domains,
        ["00.im", "01.im", "02.im", "03.im", "04.im"]
            .iter()
            .map(|d| d.to_string())
            .collect()
    );

    assert_eq!(report.state.cursor("im"), 5);
    assert_eq!(report.probed, 5);
    assert!(report.is_complete());
    assert!(!report.cancelled);

    let stored: usize = store_sets(dir.path()).iter().map(BTreeSet::len).sum();
    assert!(stored <= 5);
    assert_eq!(stored, 5);
}

#[tokio::test]
async fn test_persistently_failing_domain_is_uncertain() {
    let dir = TempDir::new().unwrap();
    let config = ScanConfig::default()
        .with_mode(GenerationMode::Letters)
        .with_lengths(2, 2)
        .with_tlds([".im"])
        .with_start_chars("a")
        .with_limit(3)
        .with_workers(2)
        .with_delay(Duration::ZERO, Duration::ZERO)
        .with_retries(2)
        .with_results_dir(dir.path());
    let scanner = DomainScanner::new(config).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProbeOutcome>();

    scanner
        .run_with_probe(ScriptedProbe::default(), Some(tx), CancellationToken::new())
        .await
        .unwrap();

    let mut failing = None;
    while let Ok(outcome) = rx.try_recv() {
        if outcome.domain() == "ab.im" {
            failing = Some(outcome);
        }
    }
    let failing = failing.expect("ab.im was probed");
    assert_eq!(failing.verdict, Verdict::Uncertain);
    assert_eq!(failing.attempts, 3);

    let [available, registered, uncertain] = store_sets(dir.path());
    assert!(uncertain.contains("ab.im"));
    assert!(!available.contains("ab.im"));
    assert!(!registered.contains("ab.im"));
}

#[tokio::test]
async fn test_resumed_run_matches_uninterrupted_run() {
    // Reference run
    let reference_dir = TempDir::new().unwrap();
    let reference = DomainScanner::new(digits_config(reference_dir.path())).unwrap();
    let full = reference
        .run_with_probe(ScriptedProbe::default(), None, CancellationToken::new())
        .await
        .unwrap();
    assert!(full.is_complete());

    // Interrupted run, then resume
    let dir = TempDir::new().unwrap();
    let scanner = DomainScanner::new(digits_config(dir.path())).unwrap();
    let cancel = CancellationToken::new();
    let first = scanner
        .run_with_probe(ScriptedProbe::cancelling_at(37, cancel.clone()), None, cancel)
        .await
        .unwrap();
    assert!(first.cancelled);
    assert!(!first.is_complete());
    let cursor_after_cancel = first.state.cursor("im");
    assert!(cursor_after_cancel < 100);

    let second = scanner
        .run_with_probe(ScriptedProbe::default(), None, CancellationToken::new())
        .await
        .unwrap();
    assert!(second.resumed);
    assert!(second.is_complete());
    assert_eq!(second.probed, 100 - cursor_after_cancel);
    assert!(second.sequence > first.sequence);

    assert_eq!(store_sets(dir.path()), store_sets(reference_dir.path()));
    assert_eq!(second.state.counts, full.state.counts);
    assert_eq!(second.state.counts("im").total(), 100);
}

#[tokio::test]
async fn test_fresh_run_ignores_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = digits_config(dir.path()).with_limit(20);
    let scanner = DomainScanner::new(config.clone()).unwrap();
    scanner
        .run_with_probe(ScriptedProbe::default(), None, CancellationToken::new())
        .await
        .unwrap();

    let fresh = DomainScanner::new(config.with_resume(false)).unwrap();
    let report = fresh
        .run_with_probe(ScriptedProbe::default(), None, CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.resumed);
    assert_eq!(report.probed, 20);
    // Stores never gain duplicates
    let stored: usize = store_sets(dir.path()).iter().map(BTreeSet::len).sum();
    assert_eq!(stored, 20);
}

#[tokio::test]
async fn test_loading_twice_yields_identical_state() {
    let dir = TempDir::new().unwrap();
    let scanner = DomainScanner::new(digits_config(dir.path()).with_limit(25)).unwrap();
    scanner
        .run_with_probe(ScriptedProbe::default(), None, CancellationToken::new())
        .await
        .unwrap();

    let first = scanner.load_state().unwrap().unwrap();
    let second = scanner.load_state().unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.cursor("im"), 25);
}

/// Checkpoint storage that checks every checkpoint against the result stores.
struct AuditingStorage {
    inner: FileCheckpointStorage,
    results_dir: PathBuf,
    config: ScanConfig,
    audited: Arc<AtomicUsize>,
}

impl CheckpointStorage for AuditingStorage {
    fn read(&self) -> Result<Option<Checkpoint>, ScanError> {
        self.inner.read()
    }

    fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), ScanError> {
        let [available, registered, uncertain] = store_sets(&self.results_dir);
        let generator = CandidateGenerator::new(&self.config, "im")?;
        let cursor = checkpoint.state.cursor("im");

        for index in 0..cursor {
            let domain = generator.candidate_at(index).unwrap().domain;
            assert!(
                available.contains(&domain)
                    || registered.contains(&domain)
                    || uncertain.contains(&domain),
                "{} is below cursor {} but has no stored outcome",
                domain,
                cursor
            );
        }
        assert_eq!(checkpoint.state.counts("im").total(), cursor);

        self.audited.fetch_add(1, Ordering::SeqCst);
        self.inner.write(checkpoint)
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

#[tokio::test]
async fn test_checkpoints_never_skip_unrecorded_outcomes() {
    let dir = TempDir::new().unwrap();
    let config = digits_config(dir.path()).with_workers(6).with_checkpoint_every(4);
    let scanner = DomainScanner::new(config.clone()).unwrap();
    let audited = Arc::new(AtomicUsize::new(0));

    let storage = AuditingStorage {
        inner: FileCheckpointStorage::for_config(&config),
        results_dir: dir.path().to_path_buf(),
        config: config.clone(),
        audited: audited.clone(),
    };

    let report = scanner
        .run_with_storage(
            ScriptedProbe::jittery(),
            storage,
            scanner.checkpoint_path(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.is_complete());
    assert!(audited.load(Ordering::SeqCst) >= 25);
}

/// Checkpoint storage whose second write fails.
/// Checkpoint storage whose second write fails.
struct FailingStorage {
    inner: FileCheckpointStorage,
    writes: Arc<AtomicUsize>,
    last_good: Arc<Mutex<Option<Checkpoint>>>,
}

impl FailingStorage {
    fn new(config: &ScanConfig) -> Self {
        Self {
            inner: FileCheckpointStorage::for_config(config),
            writes: Arc::new(AtomicUsize::new(0)),
            last_good: Arc::new(Mutex::new(None)),
        }
    }
}

impl CheckpointStorage for FailingStorage {
    fn read(&self) -> Result<Option<Checkpoint>, ScanError> {
        self.inner.read()
    }

    fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), ScanError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
            return Err(ScanError::persistence(self.location(), "disk full"));
        }
        self.inner.write(checkpoint)?;
        *self.last_good.lock().unwrap() = Some(checkpoint.clone());
        Ok(())
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

#[tokio::test]
async fn test_persistence_failure_halts_and_keeps_last_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = digits_config(dir.path()).with_workers(1).with_checkpoint_every(5);
    let scanner = DomainScanner::new(config.clone()).unwrap();
    let storage = FailingStorage::new(&config);
    let last_good = storage.last_good.clone();

    let result = scanner
        .run_with_storage(
            ScriptedProbe::default(),
            storage,
            scanner.checkpoint_path(),
            None,
            CancellationToken::new(),
        )
        .await;

    let err = result.unwrap_err();
    assert!(err.is_persistence());

    let expected = last_good.lock().unwrap().clone().unwrap();
    let on_disk = FileCheckpointStorage::for_config(&config)
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(on_disk, expected);
    assert_eq!(on_disk.sequence, 1);
    assert_eq!(on_disk.state.cursor("im"), 5);

    // The halted run stays resumable from that checkpoint
    let resumed = scanner
        .run_with_probe(ScriptedProbe::default(), None, CancellationToken::new())
        .await
        .unwrap();
    assert!(resumed.resumed);
    assert!(resumed.is_complete());
    assert_eq!(resumed.probed, 95);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_flush_is_final_with_many_workers() {
    let dir = TempDir::new().unwrap();
    let config = digits_config(dir.path()).with_workers(8).with_checkpoint_every(5);
    let scanner = DomainScanner::new(config.clone()).unwrap();

    let storage = FailingStorage::new(&config);
    let writes = storage.writes.clone();
    let last_good = storage.last_good.clone();

    let err = scanner
        .run_with_storage(
            ScriptedProbe::jittery(),
            storage,
            scanner.checkpoint_path(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_persistence());

    // Workers still finishing after the failure never wrote again
    assert_eq!(writes.load(Ordering::SeqCst), 2);

    let expected = last_good.lock().unwrap().clone().unwrap();
    let on_disk = FileCheckpointStorage::for_config(&config)
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(on_disk, expected);
    assert_eq!(on_disk.sequence, 1);

    let resumed = scanner
        .run_with_probe(ScriptedProbe::default(), None, CancellationToken::new())
        .await
        .unwrap();
    assert!(resumed.resumed);
    assert!(resumed.is_complete());
    assert_eq!(resumed.state.totals().total(), 100);
}

#[test]
fn test_boundary_single_length_spaces() {
    let letters = ScanConfig::default()
        .with_mode(GenerationMode::Letters)
        .with_lengths(1, 1)
        .with_tlds([".im"]);
    assert_eq!(DomainScanner::new(letters).unwrap().dry_run().unwrap().count(), 26);

    let digits = ScanConfig::default()
        .with_mode(GenerationMode::Digits)
        .with_lengths(1, 1)
        .with_tlds([".im", ".IM", "im"]);
    let scanner = DomainScanner::new(digits).unwrap();
    assert_eq!(scanner.tlds(), ["im"]);
    assert_eq!(scanner.dry_run().unwrap().count(), 10);
}
