// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod article;
mod config;
mod export;
mod result;

// Re-export all public types
pub use article::{ArticleRecord, ArticleReference, DedupKey, RawFields, normalize_doi};
pub use config::{
    Config, OutputConfig, OutputFormat, RetryConfig, ScopeConfig, SelectorConfig, SessionConfig,
    SiteConfig, TEST_MODE_MAX_ARTICLES, ThrottleConfig,
};
pub use export::{COLUMNS, ExportMetadata, ExportRow, ExportSet, FieldValue, LIST_SEPARATOR};
pub use result::{AggregatedResult, PageFailure, RunStats, StopReason};

/// A journal volume found on the issues index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VolumeRef {
    pub number: u32,
    pub year: Option<i32>,
    pub issue: Option<String>,
    pub url: String,
}
