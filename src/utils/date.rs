// src/utils/date.rs

//! Date normalisation for the free-text date labels on detail pages.
//!
//! Detail pages write dates as `24 April 2025`, but older pages and
//! mirrors use `April 24, 2025`, `24 Apr 2025`, `24th April 2025` or ISO
//! forms. Every accepted form maps onto the same [`NaiveDate`]; anything
//! else is rejected instead of guessed.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use thiserror::Error;

/// The date text did not match any supported form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized date '{raw}'")]
pub struct DateParseError {
    pub raw: String,
}

/// Formats tried in order after normalisation.
const FORMATS: &[&str] = &[
    "%d %B %Y", // 24 April 2025 / 24 Apr 2025
    "%B %d %Y", // April 24 2025 (comma stripped)
    "%d-%B-%Y", // 24-Apr-2025
    "%Y-%m-%d",
    "%Y/%m/%d",
];

static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("valid regex"));

/// `%Y` also accepts one to three digits, so the year must be spelled out.
static FULL_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}\b").expect("valid regex"));

/// Years a publication history can plausibly carry.
const YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

static SEPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsept\b\.?").expect("valid regex"));

/// Parse a single date string.
pub fn parse_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    let normalized = normalize(raw);
    if normalized.is_empty() || !FULL_YEAR.is_match(&normalized) {
        return Err(DateParseError { raw: raw.to_string() });
    }

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
        .filter(|date| YEARS.contains(&date.year()))
        .ok_or_else(|| DateParseError { raw: raw.to_string() })
}

/// Signed number of days from `from` to `to`.
///
/// Negative when `to` precedes `from`; callers decide what that means.
pub fn day_count(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

fn normalize(raw: &str) -> String {
    let text = raw
        .trim()
        .trim_matches(|c: char| matches!(c, ',' | '.' | ';' | ':'))
        .replace(',', " ");
    let text = ORDINAL.replace_all(&text, "$1");
    let text = SEPT.replace_all(&text, "Sep");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(parse_date("24 April 2025").unwrap(), ymd(2025, 4, 24));
        assert_eq!(parse_date(" 3 March 2021, ").unwrap(), ymd(2021, 3, 3));
    }

    #[test]
    fn test_alternate_forms_agree() {
        let expected = ymd(2025, 11, 20);
        for raw in [
            "20 November 2025",
            "20 Nov 2025",
            "20th November 2025",
            "November 20, 2025",
            "Nov 20 2025",
            "20-Nov-2025",
            "2025-11-20",
            "2025/11/20",
            "20 november 2025",
        ] {
            assert_eq!(parse_date(raw).unwrap(), expected, "input: {raw}");
        }
    }

    #[test]
    fn test_sept_abbreviation() {
        assert_eq!(parse_date("Sept 9, 2024").unwrap(), ymd(2024, 9, 9));
    }

    #[test]
    fn test_rejects_unknown_forms() {
        assert!(parse_date("").is_err());
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("31 February 2025").is_err());
        assert!(parse_date("2025").is_err());
        let err = parse_date("Spring 2024").unwrap_err();
        assert_eq!(err.raw, "Spring 2024");
    }

    #[test]
    fn test_rejects_short_or_implausible_years() {
        assert!(parse_date("24 April 25").is_err());
        assert!(parse_date("24 April 202").is_err());
        assert!(parse_date("April 24, 25").is_err());
        assert!(parse_date("25-04-24").is_err());
        assert!(parse_date("24 April 0025").is_err());
        assert!(parse_date("24 April 3025").is_err());
        assert_eq!(parse_date("24 April 2025").unwrap(), ymd(2025, 4, 24));
    }

    #[test]
    fn test_day_count() {
        let received = parse_date("24 April 2025").unwrap();
        let accepted = parse_date("20 November 2025").unwrap();
        assert_eq!(day_count(received, accepted), 210);
        assert_eq!(day_count(accepted, received), -210);
        assert_eq!(day_count(received, received), 0);
    }
}
