//! Roadfeed: open-data road incident ingestion
//!
//! Pulls roadworks and traffic incident feeds published by French local
//! authorities, normalizes every item to a common record, keeps what is
//! in progress, and commits reports that do not overlap an active report
//! of the same type.
//!
//! # Core Concepts
//!
//! - **Adapters**: one per provider, mapping a raw payload to `NormalizedRecord`s
//! - **Parts**: single geometries a record decomposes into, each with a representative point
//! - **Snapshot**: the active reports of one type, read once per source batch
//!
//! # Example
//!
//! ```
//! use roadfeed::{AdapterRegistry, PipelineConfig};
//!
//! let config = PipelineConfig::builtin().unwrap();
//! let registry = AdapterRegistry::builtin();
//! assert!(config.sources.iter().all(|s| registry.contains(&s.adapter)));
//! ```

pub mod adapter;
pub mod config;
pub mod dedup;
pub mod feed;
pub mod geometry;
pub mod pipeline;
pub mod record;
pub mod storage;

pub use adapter::{AdapterError, AdapterInput, AdapterRegistry, Normalized, SourceAdapter};
pub use config::{ConfigError, PipelineConfig, SnapshotPolicy, SourceConfig};
pub use dedup::{ActiveReportSnapshot, DedupEngine, DuplicateReason};
pub use feed::{FeedError, FeedFetcher, HttpFetcher, PayloadKind, RawPayload};
pub use geometry::{Geometry, GeometryError, Position, ReportPart};
pub use pipeline::{ErrorKind, Outcome, Pipeline, PipelineContext, RecordOutcome, RunSummary, SourceReport};
pub use record::{ExpiryPolicy, NormalizedRecord, RecordError, TimeWindow};
pub use storage::{
    ActiveReport, ActiveReportQuery, CanonicalReport, NewReport, OpenStore, ReportWriter,
    SqliteReportStore, StorageError, StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
