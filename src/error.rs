// src/error.rs

//! Unified error handling for the harvester.
//!
//! Failures are layered by how far they are allowed to travel:
//!
//! - [`crate::utils::date::DateParseError`] degrades a single field.
//! - [`FetchError`] degrades a single article (retried, then skipped).
//! - [`PageError`] truncates one listing scope and is recorded in run metadata.
//! - [`AppError`] is what reaches the caller; `AppError::Session` is the only
//!   failure that aborts a run.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or used
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The page session could not be acquired or became unusable
    #[error("Session error: {0}")]
    Session(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fatal session error.
    pub fn session(message: impl fmt::Display) -> Self {
        Self::Session(message.to_string())
    }
}

/// Why a single page could not be turned into usable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The site answered with an access denial or a challenge page.
    Blocked,
    /// The request did not complete in time.
    Timeout,
    /// The page loaded but the expected structure is absent.
    Malformed,
    /// Transport failure or server-side error.
    Network,
}

impl FetchErrorKind {
    /// Whether another attempt may succeed.
    pub fn is_transient(self) -> bool {
        !matches!(self, FetchErrorKind::Malformed)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::Blocked => "blocked",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Malformed => "malformed",
            FetchErrorKind::Network => "network",
        };
        f.write_str(name)
    }
}

/// A failed attempt to fetch one page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} fetching {url}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn blocked(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(FetchErrorKind::Blocked, url, message)
    }

    pub fn timeout(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(FetchErrorKind::Timeout, url, message)
    }

    pub fn malformed(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(FetchErrorKind::Malformed, url, message)
    }

    pub fn network(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(FetchErrorKind::Network, url, message)
    }

    /// Classify a transport error from the HTTP client.
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(url, error)
        } else {
            Self::network(url, error)
        }
    }
}

/// A listing page that stayed unusable after the retry budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listing page {url} failed after {attempts} attempt(s): {source}")]
pub struct PageError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: FetchError,
}
