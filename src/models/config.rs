//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Article cap applied in test mode.
pub const TEST_MODE_MAX_ARTICLES: usize = 10;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target journal and its URLs
    #[serde(default)]
    pub site: SiteConfig,

    /// Page session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Request pacing and identity rotation
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Retry budget for a single page
    #[serde(default)]
    pub retry: RetryConfig,

    /// Volume/year/count filters
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Where and how results are written
    #[serde(default)]
    pub output: OutputConfig,

    /// CSS selectors for listing and detail pages
    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.site.base_url)?;
        url::Url::parse(&self.site.issues_url)?;
        if self.site.journal_slug.trim().is_empty() {
            return Err(AppError::validation("site.journal_slug is empty"));
        }
        if self.session.timeout_secs == 0 {
            return Err(AppError::validation("session.timeout_secs must be > 0"));
        }
        if self.throttle.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(AppError::validation("throttle.user_agents is empty"));
        }
        if self.throttle.min_delay_ms > self.throttle.max_delay_ms {
            return Err(AppError::validation(
                "throttle.min_delay_ms must not exceed throttle.max_delay_ms",
            ));
        }
        if self.throttle.rotate_every == 0 {
            return Err(AppError::validation("throttle.rotate_every must be > 0"));
        }
        if self.throttle.backoff_base_ms > self.throttle.backoff_max_ms {
            return Err(AppError::validation(
                "throttle.backoff_base_ms must not exceed throttle.backoff_max_ms",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be > 0"));
        }
        if let Some([low, high]) = self.scope.volume_range {
            if low > high {
                return Err(AppError::validation("scope.volume_range is inverted"));
            }
        }
        if let Some([low, high]) = self.scope.year_range {
            if low > high {
                return Err(AppError::validation("scope.year_range is inverted"));
            }
        }
        if self.scope.max_articles == Some(0) {
            return Err(AppError::validation("scope.max_articles must be > 0"));
        }
        if self.output.formats.is_empty() {
            return Err(AppError::validation("output.formats is empty"));
        }
        Ok(())
    }
}

/// Target journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site root, used for warm-up and resolving relative links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// First page of the journal's volume/issue index
    #[serde(default = "defaults::issues_url")]
    pub issues_url: String,

    /// Journal path segment, e.g. `catena` in `/journal/catena/vol/263`
    #[serde(default = "defaults::journal_slug")]
    pub journal_slug: String,

    /// Human-readable source name written into export metadata
    #[serde(default = "defaults::source_name")]
    pub source_name: String,

    /// Visit the site root once before the index
    #[serde(default = "defaults::warm_up")]
    pub warm_up: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            issues_url: defaults::issues_url(),
            journal_slug: defaults::journal_slug(),
            source_name: defaults::source_name(),
            warm_up: defaults::warm_up(),
        }
    }
}

/// Page session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-page timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Only meaningful to a browser driver; kept for parity with the CLI flag
    #[serde(default = "defaults::headless")]
    pub headless: bool,

    /// Optional proxy for all requests
    #[serde(default)]
    pub proxy: Option<String>,

    /// Save every fetched page under this directory
    #[serde(default)]
    pub snapshot_dir: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout(),
            headless: defaults::headless(),
            proxy: None,
            snapshot_dir: None,
        }
    }
}

/// Request pacing and identity rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Lower bound of the random pre-request delay
    #[serde(default = "defaults::min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the random pre-request delay
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Rotate identity every N requests (1 = every request)
    #[serde(default = "defaults::rotate_every")]
    pub rotate_every: u32,

    /// First backoff step after a block
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling
    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,

    /// User agents to rotate through
    #[serde(default = "defaults::user_agents")]
    pub user_agents: Vec<String>,

    /// Fixed RNG seed for reproducible pacing
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: defaults::min_delay(),
            max_delay_ms: defaults::max_delay(),
            rotate_every: defaults::rotate_every(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
            user_agents: defaults::user_agents(),
            seed: None,
        }
    }
}

/// Retry budget for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per page, including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "defaults::retry_base")]
    pub base_delay_ms: u64,

    /// Delay ceiling
    #[serde(default = "defaults::retry_max")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::retry_base(),
            max_delay_ms: defaults::retry_max(),
        }
    }
}

/// Harvest scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Inclusive volume range
    #[serde(default)]
    pub volume_range: Option<[u32; 2]>,

    /// Inclusive year range
    #[serde(default)]
    pub year_range: Option<[i32; 2]>,

    /// Stop after this many records
    #[serde(default)]
    pub max_articles: Option<usize>,

    /// Cap the run at [`TEST_MODE_MAX_ARTICLES`]
    #[serde(default)]
    pub test_mode: bool,
}

impl ScopeConfig {
    /// Effective article cap, taking test mode into account.
    pub fn article_limit(&self) -> Option<usize> {
        if self.test_mode {
            Some(
                self.max_articles
                    .map_or(TEST_MODE_MAX_ARTICLES, |m| m.min(TEST_MODE_MAX_ARTICLES)),
            )
        } else {
            self.max_articles
        }
    }

    pub fn includes_volume(&self, volume: u32) -> bool {
        self.volume_range
            .is_none_or(|[low, high]| (low..=high).contains(&volume))
    }

    /// Unknown years pass; the volume filter still applies.
    pub fn includes_year(&self, year: Option<i32>) -> bool {
        match (self.year_range, year) {
            (Some([low, high]), Some(year)) => (low..=high).contains(&year),
            _ => true,
        }
    }
}

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "defaults::output_dir")]
    pub dir: String,

    /// File stem for record files
    #[serde(default = "defaults::file_stem")]
    pub file_stem: String,

    /// Formats to write
    #[serde(default = "defaults::formats")]
    pub formats: Vec<OutputFormat>,

    /// Marker written for absent values in CSV
    #[serde(default = "defaults::absent_marker")]
    pub absent_marker: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: defaults::output_dir(),
            file_stem: defaults::file_stem(),
            formats: defaults::formats(),
            absent_marker: defaults::absent_marker(),
        }
    }
}

/// CSS selectors for the target site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Year section on the issues page
    #[serde(default = "defaults::year_section")]
    pub year_section: String,

    /// Header inside a year section holding the year
    #[serde(default = "defaults::year_header")]
    pub year_header: String,

    /// Pagination link on index and listing pages
    #[serde(default = "defaults::next_page")]
    pub next_page: String,

    /// Container that must exist on a volume listing page
    #[serde(default = "defaults::article_list")]
    pub article_list: String,

    /// One article entry on a volume listing page
    #[serde(default = "defaults::article_item")]
    pub article_item: String,

    /// Title link inside an article entry
    #[serde(default = "defaults::article_link")]
    pub article_link: String,

    /// Article title on the detail page
    #[serde(default = "defaults::detail_title")]
    pub detail_title: String,

    /// DOI link on the detail page
    #[serde(default = "defaults::detail_doi")]
    pub detail_doi: String,

    /// Author names on the detail page (fallback to citation metadata)
    #[serde(default = "defaults::detail_authors")]
    pub detail_authors: String,

    /// Publication history block holding the date labels
    #[serde(default = "defaults::detail_history")]
    pub detail_history: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            year_section: defaults::year_section(),
            year_header: defaults::year_header(),
            next_page: defaults::next_page(),
            article_list: defaults::article_list(),
            article_item: defaults::article_item(),
            article_link: defaults::article_link(),
            detail_title: defaults::detail_title(),
            detail_doi: defaults::detail_doi(),
            detail_authors: defaults::detail_authors(),
            detail_history: defaults::detail_history(),
        }
    }
}

mod defaults {
    use super::OutputFormat;

    // Site defaults
    pub fn base_url() -> String {
        "https://www.sciencedirect.com".into()
    }
    pub fn issues_url() -> String {
        "https://www.sciencedirect.com/journal/catena/issues".into()
    }
    pub fn journal_slug() -> String {
        "catena".into()
    }
    pub fn source_name() -> String {
        "CATENA Journal (ScienceDirect)".into()
    }
    pub fn warm_up() -> bool {
        true
    }

    // Session defaults
    pub fn timeout() -> u64 {
        30
    }
    pub fn headless() -> bool {
        true
    }

    // Throttle defaults
    pub fn min_delay() -> u64 {
        2_000
    }
    pub fn max_delay() -> u64 {
        5_000
    }
    pub fn rotate_every() -> u32 {
        10
    }
    pub fn backoff_base() -> u64 {
        5_000
    }
    pub fn backoff_max() -> u64 {
        60_000
    }
    pub fn user_agents() -> Vec<String> {
        vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15".into(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
        ]
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_base() -> u64 {
        5_000
    }
    pub fn retry_max() -> u64 {
        30_000
    }

    // Output defaults
    pub fn output_dir() -> String {
        "data".into()
    }
    pub fn file_stem() -> String {
        "catena_articles".into()
    }
    pub fn formats() -> Vec<OutputFormat> {
        vec![OutputFormat::Csv, OutputFormat::Json]
    }
    pub fn absent_marker() -> String {
        "NA".into()
    }

    // Selector defaults
    pub fn year_section() -> String {
        "div.accordion-panel".into()
    }
    pub fn year_header() -> String {
        "button.accordion-panel-header, h2, h3, h4".into()
    }
    pub fn next_page() -> String {
        "a.next-link, a[rel=\"next\"], link[rel=\"next\"]".into()
    }
    pub fn article_list() -> String {
        ".article-list, ol.js-article-list".into()
    }
    pub fn article_item() -> String {
        "li.js-article-list-item".into()
    }
    pub fn article_link() -> String {
        "a.article-content-title, h2 a, h3 a".into()
    }
    pub fn detail_title() -> String {
        "h1 span.title-text, h1.article-title, h1".into()
    }
    pub fn detail_doi() -> String {
        "a.doi".into()
    }
    pub fn detail_authors() -> String {
        "#author-group .react-xocs-alternative-link, .author-group .author".into()
    }
    pub fn detail_history() -> String {
        "div.publication-history, p.article-dates".into()
    }
}
