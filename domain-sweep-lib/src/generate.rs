//! Candidate name generation.
//!
//! Produces the deterministic, restartable sequence of candidates for one TLD.
//! Labels are enumerated length by length; within a length the rightmost
//! position varies fastest, like an odometer over the mode's alphabet:
//!
//! ```
//! use domain_sweep_lib::{CandidateGenerator, GenerationMode, ScanConfig};
//!
//! let config = ScanConfig::default()
//!     .with_mode(GenerationMode::Digits)
//!     .with_lengths(2, 2)
//!     .with_tlds([".im"]);
//! let names: Vec<String> = CandidateGenerator::new(&config, "im")
//!     .unwrap()
//!     .take(3)
//!     .map(|c| c.domain)
//!     .collect();
//! assert_eq!(names, ["00.im", "01.im", "02.im"]);
//! ```
//!
//! Because every label maps to a mixed-radix number, seeking to an index is
//! arithmetic: resuming deep into a large space does not replay it.

use crate::error::ScanError;
use crate::types::{Candidate, ScanConfig};
use crate::utils::min_label_length;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Lazy candidate sequence for one TLD.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    tld: String,
    /// Options for the first position (narrowed by `start_chars`)
    first: Vec<char>,
    /// Options for every other position
    rest: Vec<char>,
    /// (label length, number of labels) in generation order
    buckets: Vec<(usize, u64)>,
    total: u64,
    next: u64,
}

impl CandidateGenerator {
    /// Build the generator for `tld` (normalized, without the leading dot).
    pub fn new(config: &ScanConfig, tld: &str) -> Result<Self, ScanError> {
        let first = config.first_chars();
        let rest = config.mode.alphabet();

        if first.is_empty() {
            return Err(ScanError::config("no characters available for the first position"));
        }

        let shortest = config.min_length.max(min_label_length(tld));
        let mut buckets = Vec::new();
        let mut total: u64 = 0;

        for length in shortest..=config.max_length {
            let count = (1..length)
                .try_fold(first.len() as u64, |acc, _| acc.checked_mul(rest.len() as u64))
                .ok_or_else(|| {
                    ScanError::config(format!("candidate space for length {} overflows", length))
                })?;
            total = total.checked_add(count).ok_or_else(|| {
                ScanError::config("candidate space overflows the index range")
            })?;
            buckets.push((length, count));
        }

        if let Some(limit) = config.limit {
            total = total.min(limit);
        }

        Ok(Self {
            tld: tld.to_string(),
            first,
            rest,
            buckets,
            total,
            next: 0,
        })
    }

    /// Continue from `index` (the first candidate not yet completed).
    pub fn resume_from(mut self, index: u64) -> Self {
        self.next = index.min(self.total);
        self
    }

    pub fn tld(&self) -> &str {
        &self.tld
    }

    /// Number of candidates in the full sequence.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Index of the next candidate this generator yields.
    pub fn position(&self) -> u64 {
        self.next
    }

    pub fn remaining(&self) -> u64 {
        self.total - self.next
    }

    /// Label (without TLD) at `index`, or `None` past the end.
    pub fn label_at(&self, index: u64) -> Option<String> {
        if index >= self.total {
            return None;
        }

        let mut offset = index;
        for &(length, count) in &self.buckets {
            if offset >= count {
                offset -= count;
                continue;
            }

            let radix = self.rest.len() as u64;
            let mut chars = Vec::with_capacity(length);
            for _ in 1..length {
                chars.push(self.rest[(offset % radix) as usize]);
                offset /= radix;
            }
            chars.push(self.first[offset as usize]);
            chars.reverse();
            return Some(chars.into_iter().collect());
        }

        None
    }

    pub fn candidate_at(&self, index: u64) -> Option<Candidate> {
        self.label_at(index).map(|label| Candidate {
            tld: self.tld.clone(),
            index,
            domain: format!("{}.{}", label, self.tld),
        })
    }
}

impl Iterator for CandidateGenerator {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let candidate = self.candidate_at(self.next)?;
        self.next += 1;
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Shared candidate source for the worker pool.
///
/// Chains the per-TLD generators in configuration order; workers pull from it
/// one candidate at a time.
#[derive(Debug, Clone)]
pub struct CandidateFeed {
    generators: Arc<Mutex<VecDeque<CandidateGenerator>>>,
}

impl CandidateFeed {
    pub fn new(generators: Vec<CandidateGenerator>) -> Self {
        Self {
            generators: Arc::new(Mutex::new(generators.into())),
        }
    }

    /// Next candidate across all TLDs, or `None` once every TLD is exhausted.
    pub fn next_candidate(&self) -> Option<Candidate> {
        let mut generators = self
            .generators
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        while let Some(current) = generators.front_mut() {
            if let Some(candidate) = current.next() {
                return Some(candidate);
            }
            generators.pop_front();
        }
        None
    }

    /// Candidates not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.generators
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(CandidateGenerator::remaining)
            .sum()
    }
}
