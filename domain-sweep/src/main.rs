//! Domain Sweep CLI Application
//!
//! A command-line interface for sweeping generated domain names over DNS and
//! HTTP. This CLI drives the domain-sweep-lib scanning engine.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use domain_sweep_lib::{
    load_env_config, parse_duration_string, ConfigManager, DomainScanner, GenerationMode,
    ResultFormat, ScanConfig,
};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for domain-sweep
#[derive(Parser, Debug)]
#[command(name = "domain-sweep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Sai Dutt G.V <gvs46@protonmail.com>")]
#[command(about = "Sweep generated domain names for availability over DNS and HTTP")]
#[command(
    long_about = "Sweep every short domain name of a given shape across a set of TLDs, classifying each as available, registered or uncertain from DNS and HTTP evidence.\n\nRuns are rate-limited, checkpointed and resume automatically after an interruption."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Character set for generated names: letters, digits or alphanumeric
    #[arg(long = "mode", value_name = "MODE", help_heading = "Generation")]
    pub mode: Option<String>,

    /// Shortest label length to generate
    #[arg(long = "min-length", value_name = "N", help_heading = "Generation")]
    pub min_length: Option<usize>,

    /// Longest label length to generate
    #[arg(long = "max-length", value_name = "N", help_heading = "Generation")]
    pub max_length: Option<usize>,

    /// TLDs to sweep (comma-separated or multiple -t flags)
    #[arg(short = 't', long = "tld", value_name = "TLD", value_delimiter = ',', action = clap::ArgAction::Append, help_heading = "Generation")]
    pub tlds: Option<Vec<String>>,

    /// Only generate names starting with one of these characters
    #[arg(long = "start-chars", value_name = "CHARS", help_heading = "Generation")]
    pub start_chars: Option<String>,

    /// Stop after this many candidates per TLD
    #[arg(long = "limit", value_name = "N", help_heading = "Generation")]
    pub limit: Option<u64>,

    /// List the candidates that would be probed and exit
    #[arg(long = "dry-run", help_heading = "Generation")]
    pub dry_run: bool,

    /// Concurrent probes (default: 3, max: 100)
    #[arg(short = 'w', long = "workers", value_name = "N", help_heading = "Pacing")]
    pub workers: Option<usize>,

    /// Minimum random delay before each attempt (e.g. 500ms, 2s)
    #[arg(long = "delay-min", value_name = "DURATION", help_heading = "Pacing")]
    pub delay_min: Option<String>,

    /// Maximum random delay before each attempt
    #[arg(long = "delay-max", value_name = "DURATION", help_heading = "Pacing")]
    pub delay_max: Option<String>,

    /// Timeout for each DNS or HTTP probe
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Probing")]
    pub timeout: Option<String>,

    /// Extra attempts for inconclusive candidates
    #[arg(long = "retries", value_name = "N", help_heading = "Probing")]
    pub retries: Option<u32>,

    /// Only probe HTTP when DNS is inconclusive
    #[arg(long = "no-http-evidence", help_heading = "Probing")]
    pub no_http_evidence: bool,

    /// Write a checkpoint every N outcomes
    #[arg(long = "checkpoint-size", value_name = "N", help_heading = "Checkpoints")]
    pub checkpoint_size: Option<u64>,

    /// Also write a checkpoint when this much time has passed
    #[arg(
        long = "checkpoint-interval",
        value_name = "DURATION",
        help_heading = "Checkpoints"
    )]
    pub checkpoint_interval: Option<String>,

    /// Ignore an existing checkpoint and start from the beginning
    #[arg(long = "fresh", help_heading = "Checkpoints")]
    pub fresh: bool,

    /// Directory for result stores and checkpoints
    #[arg(long = "results-dir", value_name = "DIR", help_heading = "Output")]
    pub results_dir: Option<PathBuf>,

    /// Result store format: plain or jsonl
    #[arg(long = "format", value_name = "FORMAT", help_heading = "Output")]
    pub format: Option<String>,

    /// Print the final report as JSON instead of live output
    #[arg(short = 'j', long = "json", help_heading = "Output")]
    pub json: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Show per-attempt details and debug logging
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    if let Err(e) = run_sweep(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over flags.
fn init_logging(args: &Args) {
    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Main sweep logic
async fn run_sweep(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    let scanner = DomainScanner::new(config)?;

    if args.dry_run {
        for candidate in scanner.dry_run()? {
            println!("{}", candidate.domain);
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight probes");
            interrupt.cancel();
        }
    });

    let report = if args.json {
        scanner.run(None, cancel).await?
    } else {
        let planned: u64 = scanner.planned()?.values().sum();
        ui::print_header(scanner.config(), scanner.tlds(), planned);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let debug = args.debug;
        let printer = tokio::spawn(async move {
            let mut n = 0;
            while let Some(outcome) = rx.recv().await {
                n += 1;
                ui::print_outcome(n, &outcome, debug);
            }
        });

        let result = scanner.run(Some(tx), cancel).await;
        // The sender is gone once the scan returns, so the printer drains and ends
        let _ = printer.await;
        let report = result?;
        ui::print_summary(&report);
        report
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Build the scan configuration: defaults, config file, DS_* environment, CLI flags.
fn build_config(args: &Args) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    let mut config = ScanConfig::default();
    let env_config = load_env_config(args.verbose);

    // Step 1: config file (explicit --config, then DS_CONFIG, then discovery)
    let explicit = args.config.clone().or_else(|| env_config.config.clone());
    if let Some(path) = &explicit {
        info!(path = %path.display(), "using explicit config file");
    }
    let file_config = ConfigManager::new(args.verbose)
        .resolve(explicit.as_deref())
        .map_err(|e| format!("Failed to load configuration: {}", e))?;
    file_config.apply_to(&mut config)?;

    // Step 2: environment variables (DS_*)
    env_config.apply_to(&mut config);

    // Step 3: CLI arguments (highest precedence)
    apply_cli_args_to_config(&mut config, args)?;

    config.validate()?;
    Ok(config)
}

/// Apply CLI arguments to config. Only flags the user passed override.
fn apply_cli_args_to_config(
    config: &mut ScanConfig,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(mode) = &args.mode {
        config.mode = mode.parse::<GenerationMode>()?;
    }
    if let Some(min_length) = args.min_length {
        config.min_length = min_length;
    }
    if let Some(max_length) = args.max_length {
        config.max_length = max_length;
    }
    if let Some(tlds) = &args.tlds {
        config.tlds = tlds.clone();
    }
    if let Some(chars) = &args.start_chars {
        config.start_chars = Some(chars.clone());
    }
    if let Some(limit) = args.limit {
        config.limit = Some(limit);
    }

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(delay) = &args.delay_min {
        config.delay_min = parse_duration_arg("--delay-min", delay)?;
    }
    if let Some(delay) = &args.delay_max {
        config.delay_max = parse_duration_arg("--delay-max", delay)?;
    }
    if let Some(timeout) = &args.timeout {
        config.timeout = parse_duration_arg("--timeout", timeout)?;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if args.no_http_evidence {
        config.http_evidence = false;
    }

    if let Some(size) = args.checkpoint_size {
        config.checkpoint_every = size;
    }
    if let Some(interval) = &args.checkpoint_interval {
        config.checkpoint_interval = Some(parse_duration_arg("--checkpoint-interval", interval)?);
    }
    if args.fresh {
        config.resume = false;
    }

    if let Some(dir) = &args.results_dir {
        config.results_dir = dir.clone();
    }
    if let Some(format) = &args.format {
        config.result_format = format.parse::<ResultFormat>()?;
    }

    Ok(())
}

fn parse_duration_arg(flag: &str, value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    parse_duration_string(value).ok_or_else(|| {
        format!(
            "Invalid {} '{}'. Use a duration like '500ms', '5s' or '2m'",
            flag, value
        )
        .into()
    })
}
