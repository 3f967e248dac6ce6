//! # Domain Sweep Library
//!
//! A resumable, rate-limited engine for sweeping generated domain names and
//! classifying them as available, registered or uncertain using DNS and HTTP
//! probes instead of WHOIS.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use domain_sweep_lib::{DomainScanner, GenerationMode, ScanConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::default()
//!         .with_mode(GenerationMode::Digits)
//!         .with_lengths(2, 2)
//!         .with_tlds([".im"]);
//!
//!     let scanner = DomainScanner::new(config)?;
//!     let report = scanner.run(None, CancellationToken::new()).await?;
//!
//!     println!("{} available", report.state.totals().available);
//!     Ok(())
//! }
//! ```
//!
//! ## Pieces
//!
//! - **Generation**: deterministic, seekable candidate sequences per TLD
//! - **Probing**: DNS (hickory) then HTTP (reqwest) under an explicit verdict policy
//! - **Rate governor**: concurrency ceiling plus randomized pacing per attempt
//! - **Checkpoints**: atomic, gap-free progress records for crash-safe resume
//! - **Result stores**: append-only, deduplicated files per TLD and verdict

// Re-export main public API types and functions
// This makes them available as domain_sweep_lib::TypeName
pub use checkpoint::{
    Checkpoint, CheckpointManager, CheckpointStorage, FileCheckpointStorage, FlushPolicy,
    ScanSignature, ScanState, CHECKPOINT_VERSION,
};
pub use concurrent::{PoolSummary, WorkerPool};
pub use config::{
    env_config_from, load_env_config, parse_duration_string, ConfigManager, EnvConfig, FileConfig,
};
pub use error::ScanError;
pub use generate::{CandidateFeed, CandidateGenerator};
pub use governor::{GovernorPermit, RateGovernor};
pub use prober::AvailabilityProber;
pub use protocols::{classify, Decision, DnsProbe, HttpProbe, NetworkProbe, Probe};
pub use scanner::{DomainScanner, ScanReport};
pub use sink::{ResultRecord, ResultSink};
pub use types::{
    Candidate, DnsEvidence, Evidence, GenerationMode, HttpEvidence, ProbeOutcome, ResultFormat,
    ScanConfig, Verdict, VerdictCounts,
};
pub use utils::{display_tld, normalize_tld, validate_domain};

// Public modules
pub mod protocols;

// Internal modules - these are not part of the public API
mod checkpoint;
mod concurrent;
mod config;
mod error;
mod generate;
mod governor;
mod prober;
mod scanner;
mod sink;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScanError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
