//! Storage abstractions for harvested records.
//!
//! A sink receives the flattened [`ExportSet`] together with the
//! [`RunSummary`] of the run that produced it.
//!
//! ## Directory Structure
//!
//! ```text
//! data/
//! ├── catena_articles.json   # metadata + rows
//! ├── catena_articles.csv    # header + rows
//! └── summary.json           # run counters, review stats, shortfalls
//! ```

pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::ExportSet;
use crate::pipeline::RunSummary;

// Re-export for convenience
pub use local::LocalStorage;

/// Metadata about a sink write.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    /// Rows written per record file
    pub record_count: usize,
    /// Every file written, in write order
    pub files: Vec<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for record sinks.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Write the record set in every configured format, then the summary.
    async fn write(&self, export: &ExportSet, summary: &RunSummary) -> Result<WriteMetadata>;
}
