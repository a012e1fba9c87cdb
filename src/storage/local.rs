//! Local filesystem sink.
//!
//! Every file is written to a temporary sibling first and renamed into
//! place, so a crashed run never leaves a half-written export behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{COLUMNS, ExportSet, OutputConfig, OutputFormat};
use crate::pipeline::RunSummary;
use crate::storage::{RecordSink, WriteMetadata};

const SUMMARY_FILE: &str = "summary.json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    file_stem: String,
    formats: Vec<OutputFormat>,
    absent_marker: String,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(root_dir, &OutputConfig::default())
    }

    /// Create a LocalStorage with names and formats from `config`.
    pub fn from_config(root_dir: impl Into<PathBuf>, config: &OutputConfig) -> Self {
        Self {
            root_dir: root_dir.into(),
            file_stem: config.file_stem.clone(),
            formats: config.formats.clone(),
            absent_marker: config.absent_marker.clone(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Render the CSV body: header, then one line per row.
    fn render_csv(&self, export: &ExportSet) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(COLUMNS)?;
        for row in &export.articles {
            writer.write_record(row.rendered(&self.absent_marker))?;
        }
        writer
            .into_inner()
            .map_err(|e| AppError::Io(e.into_error()))
    }

    fn key(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => format!("{}.json", self.file_stem),
            OutputFormat::Csv => format!("{}.csv", self.file_stem),
        }
    }
}

#[async_trait]
impl RecordSink for LocalStorage {
    async fn write(&self, export: &ExportSet, summary: &RunSummary) -> Result<WriteMetadata> {
        let mut files = Vec::new();

        for format in &self.formats {
            let key = self.key(*format);
            let path = match format {
                OutputFormat::Json => self.write_json(&key, export).await?,
                OutputFormat::Csv => {
                    let bytes = self.render_csv(export)?;
                    self.write_bytes(&key, &bytes).await?
                }
            };
            log::info!(
                "Wrote {} record(s) to {}",
                export.articles.len(),
                path.display()
            );
            files.push(path);
        }

        files.push(self.write_json(SUMMARY_FILE, summary).await?);

        Ok(WriteMetadata {
            record_count: export.articles.len(),
            files,
            timestamp: Utc::now(),
        })
    }
}
