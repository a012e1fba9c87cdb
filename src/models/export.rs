// src/models/export.rs

//! Flat, sink-ready view of a result set.
//!
//! Every row has the same columns in the same order, and a missing value is
//! always [`FieldValue::Absent`], never an empty string.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use super::{AggregatedResult, ArticleRecord};

/// Column order shared by every sink.
pub const COLUMNS: &[&str] = &[
    "title",
    "url",
    "doi",
    "article_id",
    "volume",
    "issue",
    "year",
    "authors",
    "received_date",
    "revised_date",
    "accepted_date",
    "available_online_date",
    "version_of_record_date",
    "review_days",
    "complete",
    "notes",
];

/// Separator for multi-valued cells.
pub const LIST_SEPARATOR: &str = "; ";

/// One cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Date(NaiveDate),
    Bool(bool),
    Absent,
}

impl FieldValue {
    fn text(value: Option<&str>) -> Self {
        match value {
            Some(s) if !s.is_empty() => FieldValue::Text(s.to_string()),
            _ => FieldValue::Absent,
        }
    }

    fn list(values: &[String]) -> Self {
        if values.is_empty() {
            FieldValue::Absent
        } else {
            FieldValue::Text(values.join(LIST_SEPARATOR))
        }
    }

    /// Render for text formats, using `absent` for missing values.
    pub fn render(&self, absent: &str) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Absent => absent.to_string(),
        }
    }
}

impl<T: Into<i64>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Absent, |n| FieldValue::Integer(n.into()))
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Absent => serializer.serialize_none(),
        }
    }
}

/// A record flattened to `COLUMNS` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    values: Vec<FieldValue>,
}

impl ExportRow {
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Look up a cell by column name.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Cells rendered for a text format.
    pub fn rendered(&self, absent: &str) -> Vec<String> {
        self.values.iter().map(|v| v.render(absent)).collect()
    }
}

impl From<&ArticleRecord> for ExportRow {
    fn from(record: &ArticleRecord) -> Self {
        let date = |d: Option<NaiveDate>| d.map_or(FieldValue::Absent, FieldValue::Date);

        let values = vec![
            FieldValue::Text(record.title().to_string()),
            FieldValue::Text(record.url().to_string()),
            FieldValue::text(record.doi()),
            FieldValue::text(record.article_id()),
            FieldValue::Integer(record.volume().into()),
            FieldValue::text(record.issue()),
            record.year().into(),
            FieldValue::list(record.authors()),
            date(record.received()),
            date(record.revised()),
            date(record.accepted()),
            date(record.available_online()),
            date(record.version_of_record()),
            record.review_days().into(),
            FieldValue::Bool(record.is_complete()),
            FieldValue::list(record.notes()),
        ];
        debug_assert_eq!(values.len(), COLUMNS.len());

        Self { values }
    }
}

impl Serialize for ExportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(COLUMNS.len()))?;
        for (column, value) in COLUMNS.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Header block handed to sinks with the rows.
#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_count: usize,
    pub source: String,
}

/// Read-only snapshot handed to sinks.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSet {
    pub metadata: ExportMetadata,
    pub articles: Vec<ExportRow>,
}

impl ExportSet {
    pub fn from_result(result: &AggregatedResult, source: impl Into<String>) -> Self {
        let articles: Vec<ExportRow> = result.records.iter().map(ExportRow::from).collect();
        Self {
            metadata: ExportMetadata {
                generated_at: Utc::now(),
                total_count: articles.len(),
                source: source.into(),
            },
            articles,
        }
    }
}
