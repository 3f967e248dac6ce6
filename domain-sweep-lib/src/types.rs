//! Core data types for domain availability sweeps.
//!
//! This module defines the data structures shared across the engine:
//! candidates, verdicts, probe evidence, outcomes and the scan configuration.

use crate::error::ScanError;
use crate::utils::{dedupe_tlds, min_label_length, normalize_tld};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Alphabet used to build candidate labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Lowercase letters a-z
    Letters,
    /// Digits 0-9
    Digits,
    /// Letters a-z followed by digits 0-9
    Alphanumeric,
}

impl GenerationMode {
    /// The characters this mode draws from, in generation order.
    pub fn alphabet(&self) -> Vec<char> {
        match self {
            GenerationMode::Letters => ('a'..='z').collect(),
            GenerationMode::Digits => ('0'..='9').collect(),
            GenerationMode::Alphanumeric => ('a'..='z').chain('0'..='9').collect(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Letters => "letters",
            GenerationMode::Digits => "digits",
            GenerationMode::Alphanumeric => "alphanumeric",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "letters" => Ok(GenerationMode::Letters),
            "digits" => Ok(GenerationMode::Digits),
            "alphanumeric" | "alnum" => Ok(GenerationMode::Alphanumeric),
            other => Err(ScanError::config(format!(
                "Unknown generation mode '{}'. Use letters, digits or alphanumeric",
                other
            ))),
        }
    }
}

/// One generated domain name under evaluation.
///
/// `index` is the candidate's position in the deterministic generation order
/// of its TLD and is the unit of resumability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Normalized TLD without the leading dot (e.g. "im")
    pub tld: String,
    /// Position in the generation order for this TLD
    pub index: u64,
    /// Fully qualified domain name (e.g. "ab.im")
    pub domain: String,
}

/// Three-way availability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// No DNS presence and no reachable web server
    Available,
    /// Live DNS records or a responding web server
    Registered,
    /// Probes never produced a conclusive signal
    Uncertain,
}

impl Verdict {
    /// All verdicts, in store order.
    pub const ALL: [Verdict; 3] = [Verdict::Available, Verdict::Registered, Verdict::Uncertain];

    /// Category name used for result store file names.
    pub fn category(&self) -> &'static str {
        match self {
            Verdict::Available => "available",
            Verdict::Registered => "registered",
            Verdict::Uncertain => "uncertain",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Available => write!(f, "AVAILABLE"),
            Verdict::Registered => write!(f, "REGISTERED"),
            Verdict::Uncertain => write!(f, "UNCERTAIN"),
        }
    }
}

/// What the DNS stage observed for the A/AAAA query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DnsEvidence {
    /// At least one address record resolved
    Resolved { addresses: Vec<IpAddr> },
    /// The name exists (NOERROR) but carries no address records
    NoAddress { name_servers: Vec<String> },
    /// Authoritative "name does not exist"
    NxDomain,
    /// The resolver timed out
    TimedOut,
    /// Server failure, refused query or another non-authoritative error
    Failed { reason: String },
}

/// What the HTTP stage observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HttpEvidence {
    /// A server answered with this status code
    Status { code: u16 },
    /// The connection could not be established (refused, unresolvable host)
    ConnectFailed { reason: String },
    /// No answer within the probe timeout
    TimedOut,
    /// Any other request failure
    Failed { reason: String },
}

/// Everything the probes saw for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsEvidence>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpEvidence>,

    /// Last error message when the verdict came from exhausted retries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Evidence {
    pub fn from_dns(dns: DnsEvidence) -> Self {
        Self {
            dns: Some(dns),
            ..Default::default()
        }
    }

    pub fn with_http(mut self, http: HttpEvidence) -> Self {
        self.http = Some(http);
        self
    }
}

/// Final classification of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub candidate: Candidate,
    pub verdict: Verdict,
    pub evidence: Evidence,
    /// Number of probe attempts made (initial attempt included)
    pub attempts: u32,
    /// Wall time spent probing, pacing delays included
    pub elapsed: Duration,
}

impl ProbeOutcome {
    /// Outcome for a candidate that could not be probed at all.
    pub fn failed(candidate: Candidate, error: &ScanError, attempts: u32, elapsed: Duration) -> Self {
        Self {
            candidate,
            verdict: Verdict::Uncertain,
            evidence: Evidence {
                error: Some(error.to_string()),
                ..Default::default()
            },
            attempts,
            elapsed,
        }
    }

    pub fn domain(&self) -> &str {
        &self.candidate.domain
    }
}

/// Per-verdict tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub available: u64,
    pub registered: u64,
    pub uncertain: u64,
}

impl VerdictCounts {
    pub fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Available => self.available += 1,
            Verdict::Registered => self.registered += 1,
            Verdict::Uncertain => self.uncertain += 1,
        }
    }

    pub fn get(&self, verdict: Verdict) -> u64 {
        match verdict {
            Verdict::Available => self.available,
            Verdict::Registered => self.registered,
            Verdict::Uncertain => self.uncertain,
        }
    }

    pub fn total(&self) -> u64 {
        self.available + self.registered + self.uncertain
    }
}

/// On-disk format of the per-category result stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// One domain name per line (`.txt`)
    Plain,
    /// One JSON record with evidence per line (`.jsonl`)
    Jsonl,
}

impl ResultFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ResultFormat::Plain => "txt",
            ResultFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for ResultFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" | "txt" | "text" => Ok(ResultFormat::Plain),
            "jsonl" | "json" => Ok(ResultFormat::Jsonl),
            other => Err(ScanError::config(format!(
                "Unknown result format '{}'. Use plain or jsonl",
                other
            ))),
        }
    }
}

/// Configuration for one scan run.
///
/// Consumed, not owned, by the engine: it is assembled by the caller from
/// defaults, config files, environment and CLI flags, and must pass
/// [`ScanConfig::validate`] before a scan starts.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Alphabet for generated labels
    /// Default: letters
    pub mode: GenerationMode,

    /// Shortest label length (TLD excluded)
    /// Default: 2
    pub min_length: usize,

    /// Longest label length (TLD excluded)
    /// Default: 3
    pub max_length: usize,

    /// TLDs to sweep, scanned in order
    /// Default: .im .pw .gs .com .de .ml
    pub tlds: Vec<String>,

    /// Only generate labels starting with one of these characters
    pub start_chars: Option<String>,

    /// Cap on candidates per TLD
    pub limit: Option<u64>,

    /// Concurrent workers (and governor permits)
    /// Default: 3, Range: 1-100
    pub workers: usize,

    /// Lower bound of the randomized per-attempt delay
    /// Default: 2 seconds
    pub delay_min: Duration,

    /// Upper bound of the randomized per-attempt delay
    /// Default: 5 seconds
    pub delay_max: Duration,

    /// Timeout for each DNS query and HTTP request
    /// Default: 5 seconds
    pub timeout: Duration,

    /// Retries after the initial attempt
    /// Default: 2
    pub retries: u32,

    /// Flush a checkpoint every N recorded outcomes
    /// Default: 50
    pub checkpoint_every: u64,

    /// Also flush when this much time passed since the last flush
    pub checkpoint_interval: Option<Duration>,

    /// Directory holding result stores and checkpoints
    /// Default: results_dns
    pub results_dir: PathBuf,

    /// Result store format
    /// Default: plain
    pub result_format: ResultFormat,

    /// Issue an HTTP probe for names that already resolved, for evidence
    /// Default: true
    pub http_evidence: bool,

    /// Look up NS records when a name exists without addresses
    /// Default: true
    pub check_ns: bool,

    /// Continue from an existing checkpoint for this configuration
    /// Default: true
    pub resume: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Letters,
            min_length: 2,
            max_length: 3,
            tlds: [".im", ".pw", ".gs", ".com", ".de", ".ml"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            start_chars: None,
            limit: None,
            workers: 3,
            delay_min: Duration::from_secs(2),
            delay_max: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            retries: 2,
            checkpoint_every: 50,
            checkpoint_interval: None,
            results_dir: PathBuf::from("results_dns"),
            result_format: ResultFormat::Plain,
            http_evidence: true,
            check_ns: true,
            resume: true,
        }
    }
}

impl ScanConfig {
    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_lengths(mut self, min_length: usize, max_length: usize) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    pub fn with_tlds<S: Into<String>>(mut self, tlds: impl IntoIterator<Item = S>) -> Self {
        self.tlds = tlds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_start_chars<S: Into<String>>(mut self, chars: S) -> Self {
        self.start_chars = Some(chars.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.delay_min = min;
        self.delay_max = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_checkpoint_every(mut self, every: u64) -> Self {
        self.checkpoint_every = every;
        self
    }

    pub fn with_results_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_result_format(mut self, format: ResultFormat) -> Self {
        self.result_format = format;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// TLDs normalized (lowercase, no leading dot) and deduplicated in order.
    pub fn normalized_tlds(&self) -> Vec<String> {
        dedupe_tlds(&self.tlds)
    }

    /// Characters allowed in the first label position, in alphabet order.
    pub fn first_chars(&self) -> Vec<char> {
        let alphabet = self.mode.alphabet();
        match &self.start_chars {
            Some(chars) => {
                let wanted: Vec<char> = chars.to_lowercase().chars().collect();
                alphabet.into_iter().filter(|c| wanted.contains(c)).collect()
            }
            None => alphabet,
        }
    }

    /// Check the configuration before any scanning starts.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.min_length == 0 {
            return Err(ScanError::config("min_length must be at least 1"));
        }
        if self.min_length > self.max_length {
            return Err(ScanError::config(format!(
                "min_length ({}) must not exceed max_length ({})",
                self.min_length, self.max_length
            )));
        }
        if self.max_length > 63 {
            return Err(ScanError::config(
                "max_length must not exceed 63 (DNS label limit)",
            ));
        }
        if self.workers == 0 || self.workers > 100 {
            return Err(ScanError::config("workers must be between 1 and 100"));
        }
        if self.delay_min > self.delay_max {
            return Err(ScanError::config(format!(
                "delay_min ({:?}) must not exceed delay_max ({:?})",
                self.delay_min, self.delay_max
            )));
        }
        if self.timeout.is_zero() {
            return Err(ScanError::config("timeout must be greater than zero"));
        }
        if self.checkpoint_every == 0 {
            return Err(ScanError::config("checkpoint size must be at least 1"));
        }
        if let Some(interval) = self.checkpoint_interval {
            if interval.is_zero() {
                return Err(ScanError::config(
                    "checkpoint interval must be greater than zero",
                ));
            }
        }
        if self.limit == Some(0) {
            return Err(ScanError::config("limit must be at least 1"));
        }

        if self.tlds.is_empty() {
            return Err(ScanError::config("at least one TLD is required"));
        }
        for tld in &self.tlds {
            normalize_tld(tld)?;
        }

        if let Some(chars) = &self.start_chars {
            let alphabet = self.mode.alphabet();
            if let Some(bad) = chars
                .to_lowercase()
                .chars()
                .find(|c| !alphabet.contains(c))
            {
                return Err(ScanError::config(format!(
                    "start character '{}' is not part of the {} alphabet",
                    bad, self.mode
                )));
            }
            if self.first_chars().is_empty() {
                return Err(ScanError::config("start_chars must not be empty"));
            }
        }

        for tld in self.normalized_tlds() {
            if min_label_length(&tld) > self.max_length {
                return Err(ScanError::config(format!(
                    ".{} requires labels of at least {} characters, but max_length is {}",
                    tld,
                    min_label_length(&tld),
                    self.max_length
                )));
            }
        }

        // Per-TLD space must fit the u64 index space
        let first = self.first_chars().len() as u128;
        let rest = self.mode.alphabet().len() as u128;
        let mut total: u128 = 0;
        for length in self.min_length..=self.max_length {
            let size = (1..length).try_fold(first, |acc, _| acc.checked_mul(rest));
            total = match size.and_then(|s| total.checked_add(s)) {
                Some(t) if t <= u64::MAX as u128 => t,
                _ => {
                    return Err(ScanError::config(format!(
                        "{} labels of length {}..={} exceed the supported candidate space",
                        self.mode, self.min_length, self.max_length
                    )))
                }
            };
        }

        Ok(())
    }
}
