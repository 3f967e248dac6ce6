//! Configuration file parsing and management.
//!
//! This module handles loading scan settings from TOML files and `DS_*`
//! environment variables and layering them onto a [`ScanConfig`]. Precedence,
//! lowest first: built-in defaults, config files, environment, CLI flags.

use crate::error::ScanError;
use crate::types::{GenerationMode, ResultFormat, ScanConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration loaded from TOML files.
///
/// ```toml
/// [scan]
/// mode = "digits"
/// min_length = 2
/// max_length = 3
/// tlds = [".im", ".pw"]
///
/// [rate]
/// workers = 5
/// delay_min = "500ms"
/// delay_max = "2s"
///
/// [checkpoint]
/// size = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// What to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanSection>,

    /// Concurrency and pacing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<RateSection>,

    /// Probe behavior
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeSection>,

    /// Checkpoint cadence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointSection>,

    /// Where and how results are written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tlds: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_chars: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Duration string, e.g. "2s" or "500ms"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_min: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_max: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProbeSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_evidence: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_ns: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointSection {
    /// Flush every N outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Also flush after this long
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<String>,

    /// "plain" or "jsonl"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FileConfig {
    /// Overlay the values set in this file onto `config`.
    pub fn apply_to(&self, config: &mut ScanConfig) -> Result<(), ScanError> {
        if let Some(scan) = &self.scan {
            if let Some(mode) = &scan.mode {
                config.mode = mode.parse()?;
            }
            if let Some(min) = scan.min_length {
                config.min_length = min;
            }
            if let Some(max) = scan.max_length {
                config.max_length = max;
            }
            if let Some(tlds) = &scan.tlds {
                config.tlds = tlds.clone();
            }
            if let Some(chars) = &scan.start_chars {
                config.start_chars = Some(chars.clone());
            }
            if let Some(limit) = scan.limit {
                config.limit = Some(limit);
            }
        }

        if let Some(rate) = &self.rate {
            if let Some(workers) = rate.workers {
                config.workers = workers;
            }
            if let Some(delay) = &rate.delay_min {
                config.delay_min = require_duration("delay_min", delay)?;
            }
            if let Some(delay) = &rate.delay_max {
                config.delay_max = require_duration("delay_max", delay)?;
            }
        }

        if let Some(probe) = &self.probe {
            if let Some(timeout) = &probe.timeout {
                config.timeout = require_duration("timeout", timeout)?;
            }
            if let Some(retries) = probe.retries {
                config.retries = retries;
            }
            if let Some(http_evidence) = probe.http_evidence {
                config.http_evidence = http_evidence;
            }
            if let Some(check_ns) = probe.check_ns {
                config.check_ns = check_ns;
            }
        }

        if let Some(checkpoint) = &self.checkpoint {
            if let Some(size) = checkpoint.size {
                config.checkpoint_every = size;
            }
            if let Some(interval) = &checkpoint.interval {
                config.checkpoint_interval = Some(require_duration("interval", interval)?);
            }
        }

        if let Some(output) = &self.output {
            if let Some(dir) = &output.results_dir {
                config.results_dir = PathBuf::from(dir);
            }
            if let Some(format) = &output.format {
                config.result_format = format.parse()?;
            }
        }

        Ok(())
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to report which files were loaded
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The parsed configuration or an error if parsing fails.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScanError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            ScanError::config(format!(
                "Failed to parse TOML configuration {}: {}",
                path.display(),
                e
            ))
        })?;

        // Validate the loaded configuration
        self.validate_config(&config)?;

        Ok(config)
    }

    /// Load an explicitly named file, or discover the standard ones.
    pub fn resolve(&self, explicit: Option<&Path>) -> Result<FileConfig, ScanError> {
        match explicit {
            Some(path) => {
                let config = self.load_file(path)?;
                if self.verbose {
                    info!(path = %path.display(), "loaded config file");
                }
                Ok(config)
            }
            None => self.discover_and_load(),
        }
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// Looks for configuration files in standard locations and merges them
    /// according to precedence rules. A file that exists but does not parse
    /// is an error.
    pub fn discover_and_load(&self) -> Result<FileConfig, ScanError> {
        let mut merged_config = FileConfig::default();

        // XDG first (lowest precedence), local directory last
        let paths = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in paths.into_iter().flatten() {
            let config = self.load_file(&path)?;
            if self.verbose {
                info!(path = %path.display(), "loaded config file");
            }
            merged_config = self.merge_configs(merged_config, config);
        }

        Ok(merged_config)
    }

    /// Get the local configuration file path.
    ///
    /// Looks for configuration files in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./domain-sweep.toml", "./.domain-sweep.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Get the global configuration file path.
    ///
    /// Looks for configuration files in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        [".domain-sweep.toml", "domain-sweep.toml"]
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Get the XDG configuration file path.
    ///
    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("domain-sweep").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Merge two configurations with proper precedence.
    ///
    /// Values from `higher` take precedence over values from `lower`,
    /// field by field.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            scan: merge_section(lower.scan, higher.scan, |low, high| ScanSection {
                mode: high.mode.or(low.mode),
                min_length: high.min_length.or(low.min_length),
                max_length: high.max_length.or(low.max_length),
                tlds: high.tlds.or(low.tlds),
                start_chars: high.start_chars.or(low.start_chars),
                limit: high.limit.or(low.limit),
            }),
            rate: merge_section(lower.rate, higher.rate, |low, high| RateSection {
                workers: high.workers.or(low.workers),
                delay_min: high.delay_min.or(low.delay_min),
                delay_max: high.delay_max.or(low.delay_max),
            }),
            probe: merge_section(lower.probe, higher.probe, |low, high| ProbeSection {
                timeout: high.timeout.or(low.timeout),
                retries: high.retries.or(low.retries),
                http_evidence: high.http_evidence.or(low.http_evidence),
                check_ns: high.check_ns.or(low.check_ns),
            }),
            checkpoint: merge_section(lower.checkpoint, higher.checkpoint, |low, high| {
                CheckpointSection {
                    size: high.size.or(low.size),
                    interval: high.interval.or(low.interval),
                }
            }),
            output: merge_section(lower.output, higher.output, |low, high| OutputSection {
                results_dir: high.results_dir.or(low.results_dir),
                format: high.format.or(low.format),
            }),
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), ScanError> {
        if let Some(scan) = &config.scan {
            if let Some(mode) = &scan.mode {
                mode.parse::<GenerationMode>()?;
            }
            if let Some(tlds) = &scan.tlds {
                if tlds.is_empty() {
                    return Err(ScanError::config("[scan] tlds cannot be empty"));
                }
            }
        }

        if let Some(rate) = &config.rate {
            if let Some(workers) = rate.workers {
                if workers == 0 || workers > 100 {
                    return Err(ScanError::config("Workers must be between 1 and 100"));
                }
            }
            for (name, value) in [("delay_min", &rate.delay_min), ("delay_max", &rate.delay_max)] {
                if let Some(value) = value {
                    require_duration(name, value)?;
                }
            }
        }

        if let Some(probe) = &config.probe {
            if let Some(timeout) = &probe.timeout {
                require_duration("timeout", timeout)?;
            }
        }

        if let Some(checkpoint) = &config.checkpoint {
            if checkpoint.size == Some(0) {
                return Err(ScanError::config("[checkpoint] size must be at least 1"));
            }
            if let Some(interval) = &checkpoint.interval {
                require_duration("interval", interval)?;
            }
        }

        if let Some(output) = &config.output {
            if let Some(format) = &output.format {
                format.parse::<ResultFormat>()?;
            }
        }

        Ok(())
    }
}

fn merge_section<T>(lower: Option<T>, higher: Option<T>, merge: impl FnOnce(T, T) -> T) -> Option<T> {
    match (lower, higher) {
        (Some(low), Some(high)) => Some(merge(low, high)),
        (low, high) => high.or(low),
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via DS_* environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub mode: Option<GenerationMode>,
    pub tlds: Option<Vec<String>>,
    pub workers: Option<usize>,
    pub delay_min: Option<Duration>,
    pub delay_max: Option<Duration>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub checkpoint_size: Option<u64>,
    pub results_dir: Option<PathBuf>,
    pub format: Option<ResultFormat>,
    pub config: Option<PathBuf>,
}

impl EnvConfig {
    /// Overlay the values set in the environment onto `config`.
    pub fn apply_to(&self, config: &mut ScanConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(tlds) = &self.tlds {
            config.tlds = tlds.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(delay) = self.delay_min {
            config.delay_min = delay;
        }
        if let Some(delay) = self.delay_max {
            config.delay_max = delay;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(size) = self.checkpoint_size {
            config.checkpoint_every = size;
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if let Some(format) = self.format {
            config.result_format = format;
        }
    }
}

/// Load configuration from environment variables.
///
/// Parses all DS_* environment variables and returns a structured configuration.
/// Invalid values are logged as warnings and ignored.
///
/// # Arguments
///
/// * `verbose` - Whether to log environment variable usage
pub fn load_env_config(verbose: bool) -> EnvConfig {
    env_config_from(|key| env::var(key).ok(), verbose)
}

/// Build an [`EnvConfig`] from any variable lookup.
pub fn env_config_from<F>(lookup: F, verbose: bool) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let report = |key: &str, value: &str| {
        if verbose {
            info!("Using {}={}", key, value);
        }
    };
    let reject = |key: &str, value: &str, hint: &str| {
        warn!("Ignoring invalid {}='{}': {}", key, value, hint);
    };

    let mut env_config = EnvConfig::default();

    if let Some(val) = read("DS_MODE") {
        match val.parse::<GenerationMode>() {
            Ok(mode) => {
                env_config.mode = Some(mode);
                report("DS_MODE", &val);
            }
            Err(_) => reject("DS_MODE", &val, "use letters, digits or alphanumeric"),
        }
    }

    // DS_TLDS - comma-separated TLD list
    if let Some(val) = read("DS_TLDS") {
        let tlds: Vec<String> = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !tlds.is_empty() {
            env_config.tlds = Some(tlds);
            report("DS_TLDS", &val);
        }
    }

    if let Some(val) = read("DS_WORKERS") {
        match val.parse::<usize>() {
            Ok(workers) if workers > 0 && workers <= 100 => {
                env_config.workers = Some(workers);
                report("DS_WORKERS", &val);
            }
            _ => reject("DS_WORKERS", &val, "must be 1-100"),
        }
    }

    for (key, slot) in [
        ("DS_DELAY_MIN", &mut env_config.delay_min),
        ("DS_DELAY_MAX", &mut env_config.delay_max),
        ("DS_TIMEOUT", &mut env_config.timeout),
    ] {
        if let Some(val) = read(key) {
            match parse_duration_string(&val) {
                Some(duration) => {
                    *slot = Some(duration);
                    report(key, &val);
                }
                None => reject(key, &val, "use a duration like '500ms', '5s' or '2m'"),
            }
        }
    }

    if let Some(val) = read("DS_RETRIES") {
        match val.parse::<u32>() {
            Ok(retries) => {
                env_config.retries = Some(retries);
                report("DS_RETRIES", &val);
            }
            Err(_) => reject("DS_RETRIES", &val, "must be a non-negative integer"),
        }
    }

    if let Some(val) = read("DS_CHECKPOINT_SIZE") {
        match val.parse::<u64>() {
            Ok(size) if size > 0 => {
                env_config.checkpoint_size = Some(size);
                report("DS_CHECKPOINT_SIZE", &val);
            }
            _ => reject("DS_CHECKPOINT_SIZE", &val, "must be a positive integer"),
        }
    }

    if let Some(val) = read("DS_RESULTS_DIR") {
        env_config.results_dir = Some(PathBuf::from(&val));
        report("DS_RESULTS_DIR", &val);
    }

    if let Some(val) = read("DS_FORMAT") {
        match val.parse::<ResultFormat>() {
            Ok(format) => {
                env_config.format = Some(format);
                report("DS_FORMAT", &val);
            }
            Err(_) => reject("DS_FORMAT", &val, "use plain or jsonl"),
        }
    }

    if let Some(val) = read("DS_CONFIG") {
        env_config.config = Some(PathBuf::from(&val));
        report("DS_CONFIG", &val);
    }

    env_config
}

/// Parse a duration string like "250ms", "5s", "2m" or "1.5" (seconds).
///
/// # Returns
///
/// The duration, or None if parsing fails.
pub fn parse_duration_string(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();

    let (number, micros_per_unit) = if let Some(n) = input.strip_suffix("ms") {
        (n, 1_000.0)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, 1_000_000.0)
    } else if let Some(n) = input.strip_suffix('m') {
        (n, 60_000_000.0)
    } else {
        // Assume seconds if no unit
        (input.as_str(), 1_000_000.0)
    };

    let value: f64 = number.trim().parse().ok()?;
    let micros = value * micros_per_unit;
    if !micros.is_finite() || micros < 0.0 || micros > 1e15 {
        return None;
    }
    Some(Duration::from_micros(micros.round() as u64))
}

fn require_duration(name: &str, value: &str) -> Result<Duration, ScanError> {
    parse_duration_string(value).ok_or_else(|| {
        ScanError::config(format!(
            "Invalid {} '{}'. Use a duration like '500ms', '5s' or '2m'",
            name, value
        ))
    })
}
