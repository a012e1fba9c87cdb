// src/models/article.rs

//! Article references and records.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::date::{day_count, parse_date};

/// A candidate article found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleReference {
    /// Title as shown in the listing
    pub title: String,

    /// Absolute URL of the detail page
    pub url: String,

    /// Volume number the listing belongs to
    pub volume: u32,

    /// Publication year of the volume, when the index shows one
    pub year: Option<i32>,

    /// Issue label such as "March 2025"
    #[serde(default)]
    pub issue: Option<String>,

    /// Publisher item identifier taken from the URL
    #[serde(default)]
    pub article_id: Option<String>,
}

/// Raw strings located on a detail page.
///
/// An empty value means the field was not found; whether that matters is
/// decided by [`ArticleRecord::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields {
    pub title: String,
    pub doi: String,
    pub authors: Vec<String>,
    pub received: String,
    pub revised: String,
    pub accepted: String,
    pub available_online: String,
    pub version_of_record: String,
}

impl RawFields {
    /// True when nothing at all was located.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.doi.is_empty()
            && self.authors.is_empty()
            && self.received.is_empty()
            && self.revised.is_empty()
            && self.accepted.is_empty()
            && self.available_online.is_empty()
            && self.version_of_record.is_empty()
    }
}

/// Identity used to collapse duplicate articles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Doi(String),
    Locator(String),
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Doi(doi) => write!(f, "doi:{doi}"),
            DedupKey::Locator(url) => write!(f, "url:{url}"),
        }
    }
}

/// Strip resolver prefixes and case so the same DOI always compares equal.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let bare = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower)
        .trim();

    bare.starts_with("10.").then(|| bare.to_string())
}

/// A harvested article.
///
/// Built once by [`ArticleRecord::build`]; the derived `review_days` is
/// computed at that point and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleRecord {
    title: String,
    url: String,
    doi: Option<String>,
    article_id: Option<String>,
    volume: u32,
    issue: Option<String>,
    year: Option<i32>,
    authors: Vec<String>,
    received: Option<NaiveDate>,
    revised: Option<NaiveDate>,
    accepted: Option<NaiveDate>,
    available_online: Option<NaiveDate>,
    version_of_record: Option<NaiveDate>,
    review_days: Option<i64>,
    notes: Vec<String>,
}

impl ArticleRecord {
    /// Combine a listing reference with the fields read from its detail page.
    ///
    /// Unparsable dates become absent and leave a note; this never fails.
    pub fn build(reference: &ArticleReference, raw: RawFields) -> Self {
        let mut notes = Vec::new();
        let mut date = |label: &str, value: &str| -> Option<NaiveDate> {
            if value.trim().is_empty() {
                return None;
            }
            match parse_date(value) {
                Ok(date) => Some(date),
                Err(e) => {
                    notes.push(format!("{label}: {e}"));
                    None
                }
            }
        };

        let received = date("received", &raw.received);
        let revised = date("revised", &raw.revised);
        let accepted = date("accepted", &raw.accepted);
        let available_online = date("available_online", &raw.available_online);
        let version_of_record = date("version_of_record", &raw.version_of_record);

        let review_days = match (received, accepted) {
            (Some(from), Some(to)) => {
                let days = day_count(from, to);
                if days < 0 {
                    notes.push(format!(
                        "review_days: accepted {to} precedes received {from}"
                    ));
                    None
                } else {
                    Some(days)
                }
            }
            _ => None,
        };

        let title = if raw.title.trim().is_empty() {
            reference.title.clone()
        } else {
            raw.title.trim().to_string()
        };

        Self {
            title,
            url: reference.url.clone(),
            doi: normalize_doi(&raw.doi),
            article_id: reference.article_id.clone(),
            volume: reference.volume,
            issue: reference.issue.clone(),
            year: reference.year,
            authors: raw
                .authors
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            received,
            revised,
            accepted,
            available_online,
            version_of_record,
            review_days,
            notes,
        }
    }

    /// All four tracked dates are present.
    pub fn is_complete(&self) -> bool {
        self.received.is_some()
            && self.revised.is_some()
            && self.accepted.is_some()
            && self.available_online.is_some()
    }

    /// DOI when known, else the detail-page URL.
    pub fn dedup_key(&self) -> DedupKey {
        match &self.doi {
            Some(doi) => DedupKey::Doi(doi.clone()),
            None => DedupKey::Locator(self.url.clone()),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }

    pub fn article_id(&self) -> Option<&str> {
        self.article_id.as_deref()
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn issue(&self) -> Option<&str> {
        self.issue.as_deref()
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn received(&self) -> Option<NaiveDate> {
        self.received
    }

    pub fn revised(&self) -> Option<NaiveDate> {
        self.revised
    }

    pub fn accepted(&self) -> Option<NaiveDate> {
        self.accepted
    }

    pub fn available_online(&self) -> Option<NaiveDate> {
        self.available_online
    }

    pub fn version_of_record(&self) -> Option<NaiveDate> {
        self.version_of_record
    }

    pub fn review_days(&self) -> Option<i64> {
        self.review_days
    }

    /// Data-quality notes (unparsable dates, negative review time).
    pub fn notes(&self) -> &[String] {
        &self.notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ArticleReference {
        ArticleReference {
            title: "Listing title".into(),
            url: "https://www.sciencedirect.com/science/article/pii/S0341816225001234".into(),
            volume: 263,
            year: Some(2025),
            issue: Some("March 2025".into()),
            article_id: Some("S0341816225001234".into()),
        }
    }

    fn raw(received: &str, accepted: &str) -> RawFields {
        RawFields {
            title: "Soil erosion under shifting rainfall".into(),
            doi: "https://doi.org/10.1016/j.catena.2025.109001".into(),
            authors: vec!["A. Author".into(), " ".into(), "B. Author".into()],
            received: received.into(),
            accepted: accepted.into(),
            ..RawFields::default()
        }
    }

    #[test]
    fn test_review_days_from_dates() {
        let record = ArticleRecord::build(&reference(), raw("24 April 2025", "20 November 2025"));
        assert_eq!(record.review_days(), Some(210));
        assert!(record.notes().is_empty());
        assert_eq!(record.authors(), ["A. Author", "B. Author"]);
        assert_eq!(record.doi(), Some("10.1016/j.catena.2025.109001"));
        assert_eq!(record.title(), "Soil erosion under shifting rainfall");
    }

    #[test]
    fn test_review_days_absent_without_both_dates() {
        let record = ArticleRecord::build(&reference(), raw("24 April 2025", ""));
        assert!(record.received().is_some());
        assert_eq!(record.review_days(), None);

        let record = ArticleRecord::build(&reference(), raw("", "20 November 2025"));
        assert_eq!(record.review_days(), None);
    }

    #[test]
    fn test_negative_review_days_is_absent_and_noted() {
        let record = ArticleRecord::build(&reference(), raw("20 November 2025", "24 April 2025"));
        assert!(record.received().is_some());
        assert!(record.accepted().is_some());
        assert_eq!(record.review_days(), None);
        assert_eq!(record.notes().len(), 1);
    }

    #[test]
    fn test_unparsable_date_degrades_field() {
        let record = ArticleRecord::build(&reference(), raw("sometime in spring", "20 November 2025"));
        assert_eq!(record.received(), None);
        assert_eq!(record.review_days(), None);
        assert!(record.notes()[0].starts_with("received:"));
    }

    #[test]
    fn test_record_without_dates_is_kept_incomplete() {
        let record = ArticleRecord::build(&reference(), RawFields::default());
        assert!(!record.is_complete());
        assert_eq!(record.title(), "Listing title");
        assert_eq!(record.doi(), None);
    }

    #[test]
    fn test_is_complete_requires_four_dates() {
        let mut fields = raw("24 April 2025", "20 November 2025");
        fields.revised = "10 November 2025".into();
        assert!(!ArticleRecord::build(&reference(), fields.clone()).is_complete());
        fields.available_online = "22 November 2025".into();
        assert!(ArticleRecord::build(&reference(), fields).is_complete());
    }

    #[test]
    fn test_dedup_key_prefers_doi() {
        let with_doi = ArticleRecord::build(&reference(), raw("", ""));
        assert_eq!(
            with_doi.dedup_key(),
            DedupKey::Doi("10.1016/j.catena.2025.109001".into())
        );

        let without = ArticleRecord::build(&reference(), RawFields::default());
        assert_eq!(without.dedup_key(), DedupKey::Locator(reference().url));
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1016/J.CATENA.2025.1"),
            Some("10.1016/j.catena.2025.1".into())
        );
        assert_eq!(normalize_doi("doi:10.1/x"), Some("10.1/x".into()));
        assert_eq!(normalize_doi("10.1/x"), Some("10.1/x".into()));
        assert_eq!(normalize_doi(""), None);
        assert_eq!(normalize_doi("not a doi"), None);
    }
}
