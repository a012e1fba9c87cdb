// src/models/result.rs

//! Run outcome: the record set plus what happened while building it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ArticleRecord;

/// Why a run stopped before the archive was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The max-article cutoff was reached
    Cutoff,
    /// An operator asked the run to stop
    Cancelled,
}

/// A listing scope that ended early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    /// Volume being walked, `None` for the journal index itself
    pub volume: Option<u32>,
    pub url: String,
    pub reason: String,
}

/// Counters for a single run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Detail fetches started
    pub attempted: usize,
    /// Records kept in the result
    pub succeeded: usize,
    /// Articles dropped after their detail fetch failed
    pub failed: usize,
    /// References discarded because their key was already present
    pub duplicates: usize,
    /// Listing pages that could not be fetched
    pub failed_pages: usize,
    /// Kept records that miss at least one tracked date
    pub incomplete: usize,
    pub volumes_scanned: usize,
    pub pages_scanned: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stopped: Option<StopReason>,
}

impl RunStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failed: 0,
            duplicates: 0,
            failed_pages: 0,
            incomplete: 0,
            volumes_scanned: 0,
            pages_scanned: 0,
            started_at,
            finished_at: started_at,
            stopped: None,
        }
    }

    /// References that did not end up as records.
    pub fn skipped(&self) -> usize {
        self.failed + self.duplicates
    }
}

/// The record set of one run, in first-seen order.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResult {
    pub records: Vec<ArticleRecord>,
    pub stats: RunStats,
    pub shortfalls: Vec<PageFailure>,
}

impl AggregatedResult {
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            stats: RunStats::new(started_at),
            shortfalls: Vec::new(),
        }
    }

    /// True when some listing scope was cut short.
    pub fn is_partial(&self) -> bool {
        !self.shortfalls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_counts_failures_and_duplicates() {
        let mut stats = RunStats::new(Utc::now());
        stats.failed = 2;
        stats.duplicates = 3;
        assert_eq!(stats.skipped(), 5);
    }

    #[test]
    fn test_partial_when_shortfall_recorded() {
        let mut result = AggregatedResult::empty(Utc::now());
        assert!(!result.is_partial());
        result.shortfalls.push(PageFailure {
            volume: Some(260),
            url: "https://example.com/vol/260".into(),
            reason: "blocked".into(),
        });
        assert!(result.is_partial());
    }
}
