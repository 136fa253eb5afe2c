//! Source adapter contract
//!
//! An adapter turns one provider's raw payload into `NormalizedRecord`s.
//! It owns everything provider-specific: attribute renames, date encodings,
//! where the geometry lives. Nothing downstream knows which provider a
//! record came from except through `NormalizedRecord::source`.

use crate::feed::RawPayload;
use crate::geometry::GeometryError;
use crate::record::{NormalizedRecord, RecordError};
use chrono::DateTime;
use chrono_tz::Tz;
use thiserror::Error;

/// A problem with one raw item. Scoped to that item; siblings carry on.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ItemError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("record {record_id}: {error}")]
    Geometry {
        record_id: String,
        error: GeometryError,
    },
}

impl ItemError {
    pub fn geometry(record_id: impl Into<String>, error: GeometryError) -> Self {
        Self::Geometry {
            record_id: record_id.into(),
            error,
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            Self::Record(e) => e.record_id(),
            Self::Geometry { record_id, .. } => record_id,
        }
    }
}

/// Errors that abort a whole payload.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The payload is not in the representation this adapter reads
    #[error("invalid input: expected a {0} payload")]
    InvalidInput(&'static str),

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("no adapter registered as '{0}'")]
    UnknownAdapter(String),

    /// Raised only when `raise_on_error` is set
    #[error("aborted on invalid record: {0}")]
    Item(#[from] ItemError),
}

/// What an adapter is handed for one source batch.
#[derive(Debug, Clone, Copy)]
pub struct AdapterInput<'a> {
    /// Configured source name, for log context
    pub source: &'a str,
    pub payload: &'a RawPayload,
    /// Processing time in the feeds' civil timezone
    pub now: DateTime<Tz>,
    /// Propagate the first invalid item instead of skipping it
    pub raise_on_error: bool,
}

impl<'a> AdapterInput<'a> {
    pub fn new(source: &'a str, payload: &'a RawPayload, now: DateTime<Tz>) -> Self {
        Self {
            source,
            payload,
            now,
            raise_on_error: false,
        }
    }

    pub fn raising(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }
}

/// The result of normalizing one payload.
///
/// Partial success is the normal case: valid items come back as records
/// even when some items are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    /// Items skipped as invalid, in payload order
    pub rejected: Vec<ItemError>,
    /// Items dropped on purpose by a provider filter
    pub filtered: usize,
}

impl Normalized {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the outcome of one raw item.
    pub(crate) fn absorb(
        &mut self,
        input: &AdapterInput<'_>,
        item: Result<Vec<NormalizedRecord>, ItemError>,
    ) -> Result<(), AdapterError> {
        match item {
            Ok(records) => {
                self.records.extend(records);
                Ok(())
            }
            Err(error) if input.raise_on_error => Err(AdapterError::Item(error)),
            Err(error) => {
                tracing::warn!(
                    source = %input.source,
                    record = %error.record_id(),
                    error = %error,
                    "Invalid record, skipping"
                );
                self.rejected.push(error);
                Ok(())
            }
        }
    }
}

/// The contract every provider adapter implements.
pub trait SourceAdapter: Send + Sync {
    /// Registry key, referenced by `SourceConfig::adapter`
    fn id(&self) -> &str;

    /// Normalize a payload.
    ///
    /// Invalid items are logged and returned in `Normalized::rejected`
    /// unless `input.raise_on_error` is set, in which case the first one
    /// aborts with `AdapterError::Item`.
    fn normalize(&self, input: &AdapterInput<'_>) -> Result<Normalized, AdapterError>;
}
