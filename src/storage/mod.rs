//! Report storage
//!
//! The pipeline talks to the report store through two narrow traits,
//! `ActiveReportQuery` and `ReportWriter`. `SqliteReportStore` implements
//! both for the CLI and the tests.

mod sqlite;
mod traits;

pub use sqlite::SqliteReportStore;
pub use traits::{
    ActiveReport, ActiveReportQuery, CanonicalReport, NewReport, OpenStore, ReportWriter,
    StorageError, StorageResult, DEFAULT_DOWNVOTES_THRESHOLD,
};
