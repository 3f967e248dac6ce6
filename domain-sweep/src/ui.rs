//! Terminal display for domain-sweep.
//!
//! Header, one line per outcome and the closing per-TLD summary. Everything
//! here writes to stdout; logging goes to stderr.

use console::{pad_str, style, Alignment};
use domain_sweep_lib::{display_tld, ProbeOutcome, ScanConfig, ScanReport, Verdict};

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a scan.
pub fn print_header(config: &ScanConfig, tlds: &[String], planned: u64) {
    println!(
        "{} {} {}",
        style("domain-sweep").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- {} candidate{} across {} TLD{}",
            planned,
            if planned == 1 { "" } else { "s" },
            tlds.len(),
            if tlds.len() == 1 { "" } else { "s" },
        ))
        .dim(),
    );

    let tld_list: Vec<String> = tlds.iter().map(|t| display_tld(t)).collect();
    let mut meta_parts = vec![
        format!("Mode: {}", config.mode),
        format!("Lengths: {}-{}", config.min_length, config.max_length),
        format!("TLDs: {}", tld_list.join(" ")),
        format!("Workers: {}", config.workers),
    ];
    if let Some(chars) = &config.start_chars {
        meta_parts.push(format!("Start: {}", chars));
    }
    if let Some(limit) = config.limit {
        meta_parts.push(format!("Limit: {}", limit));
    }

    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Outcome line ─────────────────────────────────────────────────────────────

fn styled_verdict(verdict: Verdict) -> String {
    let label = verdict.to_string();
    match verdict {
        Verdict::Available => style(label).green().bold().to_string(),
        Verdict::Registered => style(label).red().to_string(),
        Verdict::Uncertain => style(label).yellow().to_string(),
    }
}

/// One result line, e.g. `[12] ab.im  AVAILABLE`.
pub fn outcome_line(n: u64, outcome: &ProbeOutcome, debug: bool) -> String {
    let padded_domain = pad_str(outcome.domain(), 30, Alignment::Left, Some(".."));
    let mut line = format!(
        "  {} {}  {}",
        style(format!("[{}]", n)).dim(),
        padded_domain,
        styled_verdict(outcome.verdict),
    );

    if outcome.verdict == Verdict::Uncertain {
        if let Some(error) = &outcome.evidence.error {
            line.push_str(&format!("  {}", style(error).dim()));
        }
    }
    if debug {
        line.push_str(&format!(
            "  {}",
            style(format!(
                "({} attempt{}, {:.2}s)",
                outcome.attempts,
                if outcome.attempts == 1 { "" } else { "s" },
                outcome.elapsed.as_secs_f64()
            ))
            .dim()
        ));
    }
    line
}

pub fn print_outcome(n: u64, outcome: &ProbeOutcome, debug: bool) {
    println!("{}", outcome_line(n, outcome, debug));
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the per-TLD summary with colored counts.
pub fn print_summary(report: &ScanReport) {
    println!();
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );

    for (tld, planned) in &report.planned {
        let counts = report.state.counts(tld);
        println!(
            "  {}  {}/{}  {}  {}  {}  {}  {}",
            pad_str(&display_tld(tld), 8, Alignment::Left, None),
            report.state.cursor(tld),
            planned,
            style("|").dim(),
            style(format!("{} available", counts.available)).green(),
            style(format!("{} registered", counts.registered)).red(),
            style(format!("{} uncertain", counts.uncertain)).yellow(),
            style("|").dim(),
        );
    }

    let totals = report.state.totals();
    let status = if report.cancelled {
        style("cancelled, resume by running the same command again").yellow()
    } else if report.is_complete() {
        style("complete").green()
    } else {
        style("incomplete").yellow()
    };
    println!(
        "  {} probed in {:.1}s  {}  {} total  {}  {}",
        style(report.probed).bold(),
        report.elapsed.as_secs_f64(),
        style("|").dim(),
        totals.total(),
        style("|").dim(),
        status,
    );
    println!(
        "  {}",
        style(format!("checkpoint: {}", report.checkpoint.display())).dim()
    );
}
