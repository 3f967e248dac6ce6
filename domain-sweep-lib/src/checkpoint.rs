//! Durable scan progress.
//!
//! The [`CheckpointManager`] keeps, for every TLD, the index of the next
//! candidate whose outcome is still outstanding. Outcomes may complete in any
//! order; they wait in a holding area until the gap below them closes, so a
//! checkpoint never claims an index whose outcome was not recorded.
//!
//! Checkpoints are JSON documents written through a temporary file in the
//! same directory, synced, then renamed over the previous one.

use crate::error::ScanError;
use crate::types::{GenerationMode, ProbeOutcome, ScanConfig, Verdict, VerdictCounts};
use crate::utils::{file_safe_tld, normalize_tld};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

/// Format version written into every checkpoint.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Longest file stem used before falling back to a hashed name.
const MAX_STEM_LEN: usize = 120;

/// Everything that determines the candidate order.
///
/// Two runs with equal signatures enumerate identical sequences, so a
/// checkpoint is only reused when the signature matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSignature {
    pub mode: GenerationMode,
    pub min_length: usize,
    pub max_length: usize,
    /// Normalized, sorted
    pub tlds: Vec<String>,
    /// Effective first characters, in alphabet order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_chars: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl ScanSignature {
    pub fn from_config(config: &ScanConfig) -> Self {
        let mut tlds = config.normalized_tlds();
        tlds.sort();

        Self {
            mode: config.mode,
            min_length: config.min_length,
            max_length: config.max_length,
            tlds,
            start_chars: config
                .start_chars
                .as_ref()
                .map(|_| config.first_chars().into_iter().collect()),
            limit: config.limit,
        }
    }

    /// File stem for this signature's checkpoint, e.g.
    /// `checkpoint_digits_2-2_im_pw_limit_5`.
    pub fn file_stem(&self) -> String {
        let tlds: Vec<String> = self.tlds.iter().map(|t| file_safe_tld(t)).collect();
        let mut stem = format!(
            "checkpoint_{}_{}-{}_{}",
            self.mode,
            self.min_length,
            self.max_length,
            tlds.join("_")
        );
        if let Some(chars) = &self.start_chars {
            stem.push_str(&format!("_start_{}", chars));
        }
        if let Some(limit) = self.limit {
            stem.push_str(&format!("_limit_{}", limit));
        }

        if stem.len() > MAX_STEM_LEN {
            stem = format!(
                "checkpoint_{}_{}-{}_{:016x}",
                self.mode,
                self.min_length,
                self.max_length,
                fnv1a(stem.as_bytes())
            );
        }
        stem
    }
}

/// Stable 64-bit FNV-1a; `DefaultHasher` output is not guaranteed across releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Progress of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanState {
    pub signature: ScanSignature,
    /// Next expected index per TLD; everything below it is recorded
    pub cursors: BTreeMap<String, u64>,
    /// Verdict counts for the candidates below each cursor
    pub counts: BTreeMap<String, VerdictCounts>,
}

impl ScanState {
    pub fn new(signature: ScanSignature) -> Self {
        Self {
            signature,
            cursors: BTreeMap::new(),
            counts: BTreeMap::new(),
        }
    }

    pub fn cursor(&self, tld: &str) -> u64 {
        self.cursors.get(tld).copied().unwrap_or(0)
    }

    pub fn counts(&self, tld: &str) -> VerdictCounts {
        self.counts.get(tld).copied().unwrap_or_default()
    }

    /// Counts summed over all TLDs.
    pub fn totals(&self) -> VerdictCounts {
        self.counts
            .values()
            .fold(VerdictCounts::default(), |mut acc, counts| {
                acc.available += counts.available;
                acc.registered += counts.registered;
                acc.uncertain += counts.uncertain;
                acc
            })
    }
}

/// Durable snapshot of a [`ScanState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    /// Increases by one with every successful flush
    pub sequence: u64,
    /// Milliseconds since the Unix epoch
    pub written_at_ms: u64,
    pub state: ScanState,
}

/// Where checkpoints live.
pub trait CheckpointStorage: Send {
    /// Latest checkpoint, or `None` when nothing was written yet.
    fn read(&self) -> Result<Option<Checkpoint>, ScanError>;

    /// Replace the stored checkpoint atomically.
    fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), ScanError>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}

/// One JSON file per scan signature.
#[derive(Debug, Clone)]
pub struct FileCheckpointStorage {
    path: PathBuf,
}

impl FileCheckpointStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `<results_dir>/<signature stem>.json`
    pub fn for_config(config: &ScanConfig) -> Self {
        let stem = ScanSignature::from_config(config).file_stem();
        Self::new(config.results_dir.join(format!("{}.json", stem)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, message: impl Into<String>) -> ScanError {
        ScanError::persistence(self.path.to_string_lossy(), message)
    }
}

impl CheckpointStorage for FileCheckpointStorage {
    fn read(&self) -> Result<Option<Checkpoint>, ScanError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.persistence_error(format!("cannot read checkpoint: {}", e))),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| self.persistence_error(format!("corrupt checkpoint: {}", e)))
    }

    fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), ScanError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| self.persistence_error(format!("cannot create directory: {}", e)))?;

        let body = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| self.persistence_error(format!("cannot encode checkpoint: {}", e)))?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| self.persistence_error(format!("cannot create temporary file: {}", e)))?;
        tmp.write_all(&body)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.persistence_error(format!("cannot write checkpoint: {}", e)))?;
        tmp.persist(&self.path)?;

        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// When to write a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Flush after this many recorded outcomes
    pub every: u64,
    /// Also flush once this much time passed with at least one new outcome
    pub interval: Option<Duration>,
}

impl FlushPolicy {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            every: config.checkpoint_every.max(1),
            interval: config.checkpoint_interval,
        }
    }

    pub fn is_due(&self, recorded: u64, since_last_flush: Duration) -> bool {
        if recorded == 0 {
            return false;
        }
        recorded >= self.every
            || self
                .interval
                .map(|interval| since_last_flush >= interval)
                .unwrap_or(false)
    }
}

/// Owns the scan state and its durable copy.
pub struct CheckpointManager<S: CheckpointStorage> {
    storage: S,
    state: ScanState,
    /// Completed outcomes above the cursor, per TLD
    pending: HashMap<String, BTreeMap<u64, Verdict>>,
    sequence: u64,
    policy: FlushPolicy,
    recorded_since_flush: u64,
    last_flush: Instant,
    /// First failed write; once set, nothing more is written
    failed: Option<ScanError>,
}

impl<S: CheckpointStorage> CheckpointManager<S> {
    pub fn new(storage: S, signature: ScanSignature, policy: FlushPolicy) -> Self {
        Self {
            storage,
            state: ScanState::new(signature),
            pending: HashMap::new(),
            sequence: 0,
            policy,
            recorded_since_flush: 0,
            last_flush: Instant::now(),
            failed: None,
        }
    }

    /// Load the stored checkpoint if it belongs to this signature.
    ///
    /// Returns `None` (and keeps a fresh state) when nothing is stored or the
    /// stored checkpoint was written for a different configuration. An
    /// unreadable checkpoint is an error.
    pub fn load(&mut self) -> Result<Option<ScanState>, ScanError> {
        let Some(checkpoint) = self.storage.read()? else {
            return Ok(None);
        };

        if checkpoint.version != CHECKPOINT_VERSION {
            warn!(
                location = %self.storage.location(),
                version = checkpoint.version,
                "checkpoint has an unsupported version, starting fresh"
            );
            return Ok(None);
        }
        if checkpoint.state.signature != self.state.signature {
            warn!(
                location = %self.storage.location(),
                "checkpoint belongs to a different scan configuration, starting fresh"
            );
            return Ok(None);
        }

        info!(
            location = %self.storage.location(),
            sequence = checkpoint.sequence,
            "resuming from checkpoint"
        );
        self.state = checkpoint.state.clone();
        self.sequence = checkpoint.sequence;
        self.pending.clear();
        self.recorded_since_flush = 0;
        Ok(Some(checkpoint.state))
    }

    /// Record one finished outcome.
    ///
    /// Returns `false` for an index that is already below the cursor or
    /// already held; such late duplicates are ignored.
    pub fn record(&mut self, outcome: &ProbeOutcome) -> bool {
        let tld = outcome.candidate.tld.as_str();
        let index = outcome.candidate.index;
        let mut cursor = self.state.cursor(tld);

        let held = self.pending.entry(tld.to_string()).or_default();
        if index < cursor || held.contains_key(&index) {
            warn!(tld, index, cursor, "ignoring duplicate or late outcome");
            return false;
        }
        held.insert(index, outcome.verdict);

        let counts = self.state.counts.entry(tld.to_string()).or_default();
        while let Some(verdict) = held.remove(&cursor) {
            counts.add(verdict);
            cursor += 1;
        }
        self.state.cursors.insert(tld.to_string(), cursor);

        self.recorded_since_flush += 1;
        true
    }

    pub fn flush_due(&self) -> bool {
        self.policy
            .is_due(self.recorded_since_flush, self.last_flush.elapsed())
    }

    /// Write the current state as a new checkpoint.
    ///
    /// On failure the previous checkpoint stays in place and the sequence
    /// number does not advance. The failure sticks: every later flush returns
    /// the same error without touching storage, so the last good checkpoint
    /// survives until the run is restarted.
    pub fn flush(&mut self) -> Result<Checkpoint, ScanError> {
        self.check_failed()?;

        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            sequence: self.sequence + 1,
            written_at_ms: now_millis(),
            state: self.state.clone(),
        };

        if let Err(e) = self.storage.write(&checkpoint) {
            error!(location = %self.storage.location(), error = %e, "checkpoint write failed");
            self.failed = Some(e.clone());
            return Err(e);
        }

        self.sequence = checkpoint.sequence;
        self.recorded_since_flush = 0;
        self.last_flush = Instant::now();
        info!(
            sequence = checkpoint.sequence,
            held = self.pending_len(),
            "checkpoint written"
        );
        Ok(checkpoint)
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Next expected index for `tld` (".im" and "im" are equivalent).
    pub fn cursor(&self, tld: &str) -> u64 {
        match normalize_tld(tld) {
            Ok(tld) => self.state.cursor(&tld),
            Err(_) => 0,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// A flush failed during this run.
    pub fn has_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// The error of an earlier failed flush, if any.
    pub fn check_failed(&self) -> Result<(), ScanError> {
        match &self.failed {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Outcomes recorded above a gap, not yet covered by any cursor.
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
