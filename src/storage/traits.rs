//! Report store collaborators
//!
//! The pipeline reads active reports through `ActiveReportQuery` and
//! commits new ones through `ReportWriter`; it never sees the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Minimum number of downvotes that hides a report with no expiry.
pub const DEFAULT_DOWNVOTES_THRESHOLD: i64 = 1;

/// An active report as returned by `query_active`
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveReport {
    pub lat: f64,
    pub lng: f64,
    pub downvotes: i64,
    pub expiration_time: Option<DateTime<Utc>>,
}

/// The payload of a `create` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub report_type: String,
    pub lat: f64,
    pub lng: f64,
    pub expiration_time: Option<DateTime<Utc>>,
    pub source: String,
    pub shape_geojson: String,
}

/// A committed report, owned by the store from then on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalReport {
    pub id: i64,
    pub report_type: String,
    pub lat: f64,
    pub lng: f64,
    /// Creation time, whole seconds
    pub datetime: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub source: String,
    pub shape_geojson: String,
    pub upvotes: i64,
    pub downvotes: i64,
}

/// Read side: the active reports of one category.
///
/// A report is active when its expiration time is after `now`, or when it
/// never expires and its downvotes are still below the store's threshold.
pub trait ActiveReportQuery: Send + Sync {
    fn query_active(&self, report_type: &str, now: DateTime<Utc>) -> StorageResult<Vec<ActiveReport>>;
}

/// Write side: commit one report.
///
/// Implementations must tolerate one call per accepted part without any
/// locking on the caller's side.
pub trait ReportWriter: Send + Sync {
    fn create(&self, report: NewReport) -> StorageResult<CanonicalReport>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
