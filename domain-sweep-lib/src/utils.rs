//! Utility functions for domain processing and validation.
//!
//! This module contains helpers for domain name validation, TLD
//! normalization and the per-TLD label rules used by the generator.

use crate::error::ScanError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// A single LDH label: 1-63 chars, no leading/trailing hyphen.
    static ref LABEL_RE: Regex =
        Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("label regex is valid");
}

/// Minimum label lengths imposed by specific registries.
///
/// Every other TLD accepts single-character labels.
const MIN_LABEL_LENGTHS: &[(&str, usize)] = &[("ml", 3)];

/// Validate a fully qualified domain name before it goes anywhere near the network.
///
/// Accepts lowercase LDH names with at least two labels, each label 1-63
/// characters, total length at most 253.
///
/// # Arguments
///
/// * `domain` - The domain name to validate
///
/// # Returns
///
/// `Ok(())` if valid, `Err(ScanError::InvalidDomain)` if invalid.
pub fn validate_domain(domain: &str) -> Result<(), ScanError> {
    if domain.is_empty() {
        return Err(ScanError::invalid_domain(
            domain,
            "Domain name cannot be empty",
        ));
    }

    if domain.len() > 253 {
        return Err(ScanError::invalid_domain(
            domain,
            "Domain name longer than 253 characters",
        ));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(ScanError::invalid_domain(
            domain,
            "Domain name needs a label and a TLD",
        ));
    }

    for label in labels {
        if !LABEL_RE.is_match(label) {
            return Err(ScanError::invalid_domain(
                domain,
                format!("'{}' is not a valid DNS label", label),
            ));
        }
    }

    Ok(())
}

/// Normalize a TLD as given by the user (".IM", "im", " .im ") to "im".
pub fn normalize_tld(tld: &str) -> Result<String, ScanError> {
    let cleaned = tld.trim().trim_start_matches('.').to_lowercase();

    if cleaned.is_empty() {
        return Err(ScanError::config(format!("Invalid TLD '{}'", tld)));
    }
    if !cleaned.split('.').all(|label| LABEL_RE.is_match(label)) {
        return Err(ScanError::config(format!("Invalid TLD '{}'", tld)));
    }

    Ok(cleaned)
}

/// Normalize and deduplicate TLDs, keeping the first occurrence order.
///
/// Entries that fail normalization are dropped; `ScanConfig::validate`
/// reports them before a scan starts.
pub fn dedupe_tlds(tlds: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for tld in tlds {
        if let Ok(normalized) = normalize_tld(tld) {
            if !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
    }
    seen
}

/// Shortest label the registry for `tld` accepts.
pub fn min_label_length(tld: &str) -> usize {
    MIN_LABEL_LENGTHS
        .iter()
        .find(|(name, _)| *name == tld)
        .map(|(_, len)| *len)
        .unwrap_or(1)
}

/// Render a normalized TLD the way users write it (".im").
pub fn display_tld(tld: &str) -> String {
    format!(".{}", tld)
}

/// Make a TLD safe to embed in a file name ("co.uk" -> "co_uk").
pub(crate) fn file_safe_tld(tld: &str) -> String {
    tld.replace('.', "_")
}
