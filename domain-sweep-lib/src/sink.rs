//! Category stores for probe outcomes.
//!
//! Each (TLD, verdict) pair gets its own append-only file under the results
//! directory: `im_available.txt`, `im_uncertain.jsonl` and so on. A domain
//! appears at most once per store. Stores are never rewritten; a later
//! re-probe with a different verdict lands in its own category.

use crate::error::ScanError;
use crate::types::{Evidence, ProbeOutcome, ResultFormat, ScanConfig, Verdict};
use crate::utils::file_safe_tld;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One line of a `.jsonl` store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub domain: String,
    pub tld: String,
    pub index: u64,
    pub verdict: Verdict,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub evidence: Evidence,
}

impl From<&ProbeOutcome> for ResultRecord {
    fn from(outcome: &ProbeOutcome) -> Self {
        Self {
            domain: outcome.candidate.domain.clone(),
            tld: outcome.candidate.tld.clone(),
            index: outcome.candidate.index,
            verdict: outcome.verdict,
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            evidence: outcome.evidence.clone(),
        }
    }
}

struct Store {
    path: PathBuf,
    file: File,
    seen: HashSet<String>,
}

/// Partitions outcomes into per-category stores.
pub struct ResultSink {
    dir: PathBuf,
    format: ResultFormat,
    stores: HashMap<(String, Verdict), Store>,
}

impl ResultSink {
    pub fn new<P: Into<PathBuf>>(dir: P, format: ResultFormat) -> Result<Self, ScanError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ScanError::persistence(
                dir.to_string_lossy(),
                format!("cannot create results directory: {}", e),
            )
        })?;

        Ok(Self {
            dir,
            format,
            stores: HashMap::new(),
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        Self::new(&config.results_dir, config.result_format)
    }

    /// Path of the store for `tld` and `verdict`.
    pub fn store_path(&self, tld: &str, verdict: Verdict) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            file_safe_tld(tld),
            verdict.category(),
            self.format.extension()
        ))
    }

    /// Append the outcome to its category store.
    ///
    /// Returns `false` when the domain was already in that store.
    pub fn accept(&mut self, outcome: &ProbeOutcome) -> Result<bool, ScanError> {
        let format = self.format;
        let store = self.store(&outcome.candidate.tld, outcome.verdict)?;
        let domain = outcome.domain();

        if store.seen.contains(domain) {
            debug!(domain, verdict = %outcome.verdict, "already stored");
            return Ok(false);
        }

        let mut line = match format {
            ResultFormat::Plain => domain.to_string(),
            ResultFormat::Jsonl => serde_json::to_string(&ResultRecord::from(outcome))
                .map_err(|e| write_error(&store.path, e))?,
        };
        line.push('\n');

        store
            .file
            .write_all(line.as_bytes())
            .and_then(|_| store.file.flush())
            .map_err(|e| write_error(&store.path, e))?;
        store.seen.insert(domain.to_string());
        Ok(true)
    }

    /// Make every appended line durable.
    pub fn sync(&mut self) -> Result<(), ScanError> {
        for store in self.stores.values() {
            store
                .file
                .sync_data()
                .map_err(|e| write_error(&store.path, e))?;
        }
        Ok(())
    }

    /// Domains already present in a store, reading it from disk if needed.
    pub fn stored(&mut self, tld: &str, verdict: Verdict) -> Result<Vec<String>, ScanError> {
        let mut domains: Vec<String> = self.store(tld, verdict)?.seen.iter().cloned().collect();
        domains.sort();
        Ok(domains)
    }

    fn store(&mut self, tld: &str, verdict: Verdict) -> Result<&mut Store, ScanError> {
        let key = (tld.to_string(), verdict);
        if !self.stores.contains_key(&key) {
            let path = self.store_path(tld, verdict);
            let (seen, torn) = read_existing(&path, self.format)?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| write_error(&path, e))?;
            if torn {
                file.write_all(b"\n").map_err(|e| write_error(&path, e))?;
            }
            debug!(path = %path.display(), existing = seen.len(), "opened result store");
            self.stores.insert(key.clone(), Store { path, file, seen });
        }

        self.stores
            .get_mut(&key)
            .ok_or_else(|| ScanError::internal("result store vanished"))
    }
}

/// Domains already written to a store by an earlier run, and whether the
/// file ends mid-line.
fn read_existing(path: &Path, format: ResultFormat) -> Result<(HashSet<String>, bool), ScanError> {
    let read_error = |e: std::io::Error| {
        ScanError::persistence(
            path.to_string_lossy(),
            format!("cannot read result store: {}", e),
        )
    };

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((HashSet::new(), false)),
        Err(e) => return Err(read_error(e)),
    };

    let mut reader = BufReader::new(file);
    let mut seen = HashSet::new();
    let mut line = String::new();
    let mut torn = false;

    loop {
        line.clear();
        if reader.read_line(&mut line).map_err(read_error)? == 0 {
            break;
        }
        torn = !line.ends_with('\n');

        let entry = line.trim();
        if entry.is_empty() {
            continue;
        }

        match format {
            ResultFormat::Plain => {
                seen.insert(entry.to_string());
            }
            ResultFormat::Jsonl => match serde_json::from_str::<ResultRecord>(entry) {
                Ok(record) => {
                    seen.insert(record.domain);
                }
                // A torn final line from an interrupted write
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            },
        }
    }
    Ok((seen, torn))
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> ScanError {
    ScanError::persistence(
        path.to_string_lossy(),
        format!("cannot write result store: {}", err),
    )
}
