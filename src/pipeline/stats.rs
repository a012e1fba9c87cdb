// src/pipeline/stats.rs

//! Review-time statistics and the run summary written next to the records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{AggregatedResult, ArticleRecord, PageFailure, RunStats};

/// Width of a distribution bucket, in days.
pub const BUCKET_DAYS: i64 = 30;

/// Review-days summary for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub count: usize,
    pub mean: f64,
}

/// One distribution bucket, e.g. `30-59`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

/// Summary of review days across the records that carry them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Upper median for even counts
    pub median: Option<i64>,
    pub by_year: BTreeMap<i32, YearSummary>,
    pub buckets: Vec<Bucket>,
}

impl ReviewStats {
    pub fn from_records(records: &[ArticleRecord]) -> Self {
        let mut days: Vec<i64> = records.iter().filter_map(|r| r.review_days()).collect();
        days.sort_unstable();

        let count = days.len();
        let mean = (count > 0).then(|| days.iter().sum::<i64>() as f64 / count as f64);

        let mut years: BTreeMap<i32, Vec<i64>> = BTreeMap::new();
        for record in records {
            if let (Some(year), Some(d)) = (record.year(), record.review_days()) {
                years.entry(year).or_default().push(d);
            }
        }
        let by_year = years
            .into_iter()
            .map(|(year, values)| {
                let mean = values.iter().sum::<i64>() as f64 / values.len() as f64;
                (
                    year,
                    YearSummary {
                        count: values.len(),
                        mean,
                    },
                )
            })
            .collect();

        Self {
            count,
            mean,
            min: days.first().copied(),
            max: days.last().copied(),
            median: days.get(count / 2).copied(),
            by_year,
            buckets: buckets(&days),
        }
    }
}

/// Contiguous 30-day buckets from zero up to the largest value.
fn buckets(sorted: &[i64]) -> Vec<Bucket> {
    let Some(&max) = sorted.last() else {
        return Vec::new();
    };
    let slots = (max / BUCKET_DAYS + 1) as usize;
    let mut counts = vec![0usize; slots];
    for &d in sorted {
        counts[(d / BUCKET_DAYS) as usize] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let low = i as i64 * BUCKET_DAYS;
            Bucket {
                label: format!("{}-{}", low, low + BUCKET_DAYS - 1),
                count,
            }
        })
        .collect()
}

/// Everything about a run except the records themselves.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub partial: bool,
    pub stats: RunStats,
    pub review: ReviewStats,
    pub shortfalls: Vec<PageFailure>,
}

impl RunSummary {
    pub fn from_result(result: &AggregatedResult, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            generated_at: Utc::now(),
            partial: result.is_partial(),
            stats: result.stats.clone(),
            review: ReviewStats::from_records(&result.records),
            shortfalls: result.shortfalls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleReference, RawFields};

    fn record(year: i32, received: &str, accepted: &str) -> ArticleRecord {
        let reference = ArticleReference {
            title: "t".into(),
            url: format!("https://example.com/{received}/{accepted}"),
            volume: 1,
            year: Some(year),
            issue: None,
            article_id: None,
        };
        let raw = RawFields {
            received: received.into(),
            accepted: accepted.into(),
            ..RawFields::default()
        };
        ArticleRecord::build(&reference, raw)
    }

    #[test]
    fn test_summary_values() {
        let records = vec![
            record(2024, "1 January 2024", "11 January 2024"),  // 10
            record(2024, "1 January 2024", "31 January 2024"),  // 30
            record(2025, "1 January 2025", "2 March 2025"),     // 60
            record(2025, "1 January 2025", "21 January 2025"),  // 20
        ];
        let stats = ReviewStats::from_records(&records);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, Some(30.0));
        assert_eq!(stats.min, Some(10));
        assert_eq!(stats.max, Some(60));
        assert_eq!(stats.median, Some(30));
        assert_eq!(stats.by_year[&2024].count, 2);
        assert_eq!(stats.by_year[&2025].mean, 40.0);

        let labels: Vec<_> = stats.buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["0-29", "30-59", "60-89"]);
        let counts: Vec<_> = stats.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 1, 1]);
    }

    #[test]
    fn test_records_without_review_days_are_ignored() {
        let records = vec![record(2024, "", "11 January 2024")];
        let stats = ReviewStats::from_records(&records);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.median, None);
        assert!(stats.buckets.is_empty());
        assert!(stats.by_year.is_empty());
    }
}
