// src/services/document.rs

//! Field lookup on detail pages.
//!
//! The fetcher only ever asks a [`FieldSource`] for labelled values, so any
//! document representation (rendered HTML, fixtures, a different site
//! layout) can stand behind it. [`HtmlDetailPage`] is the adapter for the
//! journal's HTML.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{RawFields, SelectorConfig};
use crate::utils::normalize_whitespace;

/// Fields a detail page can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldLabel {
    Title,
    Doi,
    Author,
    Received,
    Revised,
    Accepted,
    AvailableOnline,
    VersionOfRecord,
}

/// Labelled access to a loosely structured document.
pub trait FieldSource {
    /// First value for `label`, if the document has one.
    fn locate_field(&self, label: FieldLabel) -> Option<String>;

    /// Every value for `label`, in document order.
    fn locate_all(&self, label: FieldLabel) -> Vec<String> {
        self.locate_field(label).into_iter().collect()
    }
}

impl RawFields {
    /// Read every field from `source`; missing ones stay empty.
    pub fn extract(source: &dyn FieldSource) -> Self {
        let get = |label| source.locate_field(label).unwrap_or_default();
        Self {
            title: get(FieldLabel::Title),
            doi: get(FieldLabel::Doi),
            authors: source.locate_all(FieldLabel::Author),
            received: get(FieldLabel::Received),
            revised: get(FieldLabel::Revised),
            accepted: get(FieldLabel::Accepted),
            available_online: get(FieldLabel::AvailableOnline),
            version_of_record: get(FieldLabel::VersionOfRecord),
        }
    }
}

static HISTORY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(received in revised form|revised|received|accepted|available online|version of record)\b",
    )
    .expect("valid regex")
});

/// Split a publication-history line into labelled date strings.
///
/// `"Received 24 April 2025, Revised 10 November 2025, Accepted ..."`
/// yields one entry per label with the text up to the next label. The
/// first occurrence of a label wins.
pub fn split_history(text: &str) -> HashMap<FieldLabel, String> {
    let matches: Vec<_> = HISTORY_LABEL.find_iter(text).collect();
    let mut fields = HashMap::new();

    for (i, m) in matches.iter().enumerate() {
        let label = match m.as_str().to_lowercase().as_str() {
            "received" => FieldLabel::Received,
            "revised" | "received in revised form" => FieldLabel::Revised,
            "accepted" => FieldLabel::Accepted,
            "available online" => FieldLabel::AvailableOnline,
            _ => FieldLabel::VersionOfRecord,
        };
        let end = matches.get(i + 1).map_or(text.len(), |next| next.start());
        let value = text[m.end()..end]
            .trim()
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .trim_end_matches(|c: char| matches!(c, ',' | ';' | '.') || c.is_whitespace());
        let value = normalize_whitespace(value);
        if !value.is_empty() {
            fields.entry(label).or_insert(value);
        }
    }
    fields
}

/// Compiled selectors for detail pages.
#[derive(Debug)]
pub struct DetailSelectors {
    title: Selector,
    doi: Selector,
    authors: Selector,
    history: Selector,
    history_fallback: Selector,
    meta_title: Selector,
    meta_doi: Selector,
    meta_author: Selector,
}

impl DetailSelectors {
    pub fn compile(config: &SelectorConfig) -> Result<Self> {
        Ok(Self {
            title: parse_selector(&config.detail_title)?,
            doi: parse_selector(&config.detail_doi)?,
            authors: parse_selector(&config.detail_authors)?,
            history: parse_selector(&config.detail_history)?,
            history_fallback: parse_selector("p, div, span")?,
            meta_title: parse_selector(r#"meta[name="citation_title"]"#)?,
            meta_doi: parse_selector(r#"meta[name="citation_doi"]"#)?,
            meta_author: parse_selector(r#"meta[name="citation_author"]"#)?,
        })
    }
}

/// Parse a CSS selector into the crate error type.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Detail page fields read out of HTML.
///
/// Everything is extracted up front so the value holds no parser state.
#[derive(Debug, Clone, Default)]
pub struct HtmlDetailPage {
    title: Option<String>,
    doi: Option<String>,
    authors: Vec<String>,
    history: HashMap<FieldLabel, String>,
}

impl HtmlDetailPage {
    pub fn parse(html: &str, selectors: &DetailSelectors) -> Self {
        let document = Html::parse_document(html);

        let title = first_text(&document, &selectors.title)
            .or_else(|| first_attr(&document, &selectors.meta_title, "content"));

        let doi = first_text(&document, &selectors.doi)
            .or_else(|| first_attr(&document, &selectors.meta_doi, "content"));

        let mut authors: Vec<String> = document
            .select(&selectors.meta_author)
            .filter_map(|m| m.value().attr("content"))
            .map(normalize_whitespace)
            .filter(|a| !a.is_empty())
            .collect();
        if authors.is_empty() {
            authors = document
                .select(&selectors.authors)
                .map(|el| element_text(&el))
                .filter(|a| !a.is_empty())
                .collect();
        }

        let history_text = document
            .select(&selectors.history)
            .next()
            .map(|el| element_text(&el))
            .or_else(|| find_history_text(&document, &selectors.history_fallback));
        let history = history_text.as_deref().map(split_history).unwrap_or_default();

        Self {
            title,
            doi,
            authors,
            history,
        }
    }
}

impl FieldSource for HtmlDetailPage {
    fn locate_field(&self, label: FieldLabel) -> Option<String> {
        match label {
            FieldLabel::Title => self.title.clone(),
            FieldLabel::Doi => self.doi.clone(),
            FieldLabel::Author => self.authors.first().cloned(),
            other => self.history.get(&other).cloned(),
        }
    }

    fn locate_all(&self, label: FieldLabel) -> Vec<String> {
        match label {
            FieldLabel::Author => self.authors.clone(),
            other => self.locate_field(other).into_iter().collect(),
        }
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(normalize_whitespace)
        .find(|t| !t.is_empty())
}

/// Smallest element whose text mentions Received together with Accepted or
/// Revised.
fn find_history_text(document: &Html, candidates: &Selector) -> Option<String> {
    document
        .select(candidates)
        .map(|el| element_text(&el))
        .filter(|t| t.contains("Received") && (t.contains("Accepted") || t.contains("Revised")))
        .min_by_key(|t| t.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
        <html><head>
          <meta name="citation_doi" content="10.1016/j.catena.2025.109001">
          <meta name="citation_author" content="Lee, Ann">
          <meta name="citation_author" content="Chen, Bo">
        </head><body>
          <h1><span class="title-text">Rill erosion on loess slopes</span></h1>
          <div class="publication-history">
            Received 24 April 2025, Revised 10 November 2025,
            Accepted 20 November 2025, Available online 22 November 2025,
            Version of Record 25 November 2025.
          </div>
        </body></html>
    "#;

    fn selectors() -> DetailSelectors {
        DetailSelectors::compile(&SelectorConfig::default()).unwrap()
    }

    #[test]
    fn test_split_history_canonical() {
        let fields = split_history(
            "Received 24 April 2025, Revised 10 November 2025, Accepted 20 November 2025, Available online 22 November 2025, Version of Record 25 November 2025.",
        );
        assert_eq!(fields[&FieldLabel::Received], "24 April 2025");
        assert_eq!(fields[&FieldLabel::Revised], "10 November 2025");
        assert_eq!(fields[&FieldLabel::Accepted], "20 November 2025");
        assert_eq!(fields[&FieldLabel::AvailableOnline], "22 November 2025");
        assert_eq!(fields[&FieldLabel::VersionOfRecord], "25 November 2025");
    }

    #[test]
    fn test_split_history_alternate_forms() {
        let fields = split_history(
            "Received: April 24, 2025; Received in revised form: November 10, 2025; Accepted: November 20, 2025",
        );
        assert_eq!(fields[&FieldLabel::Received], "April 24, 2025");
        assert_eq!(fields[&FieldLabel::Revised], "November 10, 2025");
        assert_eq!(fields[&FieldLabel::Accepted], "November 20, 2025");
        assert!(!fields.contains_key(&FieldLabel::AvailableOnline));
    }

    #[test]
    fn test_html_detail_page_fields() {
        let page = HtmlDetailPage::parse(DETAIL, &selectors());
        let raw = RawFields::extract(&page);
        assert_eq!(raw.title, "Rill erosion on loess slopes");
        assert_eq!(raw.doi, "10.1016/j.catena.2025.109001");
        assert_eq!(raw.authors, vec!["Lee, Ann", "Chen, Bo"]);
        assert_eq!(raw.received, "24 April 2025");
        assert_eq!(raw.version_of_record, "25 November 2025");
    }

    #[test]
    fn test_history_fallback_scan() {
        let html = r#"<body><div><p>Some intro</p>
            <p>Received 1 March 2024, Accepted 2 May 2024</p></div></body>"#;
        let page = HtmlDetailPage::parse(html, &selectors());
        assert_eq!(page.locate_field(FieldLabel::Received).as_deref(), Some("1 March 2024"));
        assert_eq!(page.locate_field(FieldLabel::Accepted).as_deref(), Some("2 May 2024"));
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let page = HtmlDetailPage::parse("<html><body><p>nothing</p></body></html>", &selectors());
        let raw = RawFields::extract(&page);
        assert!(raw.is_empty());
    }

    #[test]
    fn test_parse_selector_invalid() {
        assert!(parse_selector("[[invalid").is_err());
        assert!(parse_selector("div.publication-history").is_ok());
    }
}
