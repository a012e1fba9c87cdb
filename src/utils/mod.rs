//! Utility functions and helpers.

pub mod date;

use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use url::Url;

static PII: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/pii/([A-Z0-9]+)").expect("valid regex"));

static VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/vol/(\d+)").expect("valid regex"));

/// Resolve a potentially relative URL against a base URL.
///
/// Returns `None` when the result is not a valid absolute URL.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}

/// Extract the publisher item identifier from an article URL.
pub fn extract_article_id(url: &str) -> Option<String> {
    PII.captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract the volume number from a volume URL.
pub fn extract_volume(url: &str) -> Option<u32> {
    VOLUME
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shorten a title for log lines without splitting a grapheme.
pub fn truncate_title(title: &str, max: usize) -> String {
    let mut graphemes = title.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
