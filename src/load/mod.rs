pub mod bigquery;

pub use bigquery::BigQueryClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::transform::TransformedData;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Warehouse request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("BigQuery credentials unavailable: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("Warehouse returned HTTP {status} for {table}: {body}")]
    Http {
        table: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Insert errors for table {table}: {}", format_row_errors(.errors))]
    InsertErrors { table: String, errors: Vec<RowError> },

    #[error("Failed to serialise rows for table {table}: {source}")]
    Serialize {
        table: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// A rejected row as reported by the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn format_row_errors(errors: &[RowError]) -> String {
    errors
        .iter()
        .map(|row| {
            let details: Vec<String> = row
                .errors
                .iter()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.reason.as_deref().unwrap_or("unknown"),
                        e.message.as_deref().unwrap_or("")
                    )
                })
                .collect();
            format!("row {} [{}]", row.index, details.join("; "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Append-only destination for row batches.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Append `rows` to `table` in one call. Returns the per-row errors;
    /// an empty list means every row was accepted.
    async fn insert_rows(&self, table: &TableRef, rows: Vec<Value>)
        -> Result<Vec<RowError>, LoadError>;
}

#[async_trait]
impl<W: Warehouse + ?Sized> Warehouse for std::sync::Arc<W> {
    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: Vec<Value>,
    ) -> Result<Vec<RowError>, LoadError> {
        (**self).insert_rows(table, rows).await
    }
}

/// Rows written per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub pull_requests: usize,
    pub commits: usize,
    pub reviewers: usize,
    pub comments: usize,
}

impl TableCounts {
    pub fn total(&self) -> usize {
        self.pull_requests + self.commits + self.reviewers + self.comments
    }

    pub fn add(&mut self, other: TableCounts) {
        self.pull_requests += other.pull_requests;
        self.commits += other.commits;
        self.reviewers += other.reviewers;
        self.comments += other.comments;
    }
}

fn today_utc() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Writes transformed chunks into `{project}.{dataset}.*`.
pub struct Loader<W> {
    warehouse: W,
    project: String,
    dataset: String,
    today: fn() -> NaiveDate,
}

impl<W: Warehouse> Loader<W> {
    pub fn new(warehouse: W, project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            warehouse,
            project: project.into(),
            dataset: dataset.into(),
            today: today_utc,
        }
    }

    /// Override the source of the snapshot date.
    #[cfg(test)]
    pub fn with_snapshot_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    #[cfg(test)]
    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Append every non-empty table of `data`, stamping all rows with the
    /// same snapshot date.
    ///
    /// Tables are written one after another; an error on a later table
    /// leaves the earlier ones of this call already written.
    #[instrument(skip(self, data), fields(dataset = %self.dataset))]
    pub async fn load(&self, data: &TransformedData) -> Result<TableCounts, LoadError> {
        if data.is_empty() {
            warn!("no data to load, skipping");
            return Ok(TableCounts::default());
        }
        let snapshot_date = (self.today)().format("%Y-%m-%d").to_string();

        let tables = [
            ("pull_requests", stamp("pull_requests", &data.pull_requests, &snapshot_date)?),
            ("commits", stamp("commits", &data.commits, &snapshot_date)?),
            ("reviewers", stamp("reviewers", &data.reviewers, &snapshot_date)?),
            ("comments", stamp("comments", &data.comments, &snapshot_date)?),
        ];

        let mut counts = TableCounts::default();
        for (table, rows) in tables {
            if rows.is_empty() {
                warn!(table, "no rows to load, skipping");
                continue;
            }

            let table_ref = TableRef {
                project: self.project.clone(),
                dataset: self.dataset.clone(),
                table: table.to_string(),
            };
            let row_count = rows.len();
            info!(table = %table_ref, rows = row_count, "loading rows");

            let errors = self.warehouse.insert_rows(&table_ref, rows).await?;
            if !errors.is_empty() {
                return Err(LoadError::InsertErrors {
                    table: table.to_string(),
                    errors,
                });
            }

            match table {
                "pull_requests" => counts.pull_requests = row_count,
                "commits" => counts.commits = row_count,
                "reviewers" => counts.reviewers = row_count,
                _ => counts.comments = row_count,
            }
            info!(table = %table_ref, rows = row_count, "table loaded");
        }
        Ok(counts)
    }
}

/// Serialise rows to JSON objects carrying `snapshot_date`.
fn stamp<T: Serialize>(
    table: &str,
    rows: &[T],
    snapshot_date: &str,
) -> Result<Vec<Value>, LoadError> {
    rows.iter()
        .map(|row| {
            let mut value = serde_json::to_value(row).map_err(|source| LoadError::Serialize {
                table: table.to_string(),
                source,
            })?;
            if let Value::Object(map) = &mut value {
                map.insert(
                    "snapshot_date".to_string(),
                    Value::String(snapshot_date.to_string()),
                );
            }
            Ok(value)
        })
        .collect()
}
