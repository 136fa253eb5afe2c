//! Normalized records and their active time window

mod date;
mod temporal;
mod types;

pub use date::{from_epoch_millis, parse_compact_local, parse_datetime, quarter_bounds};
pub use temporal::{resolve_window, validate, ExpiryPolicy, TimeWindow, Validation, ValidatedRecord};
pub use types::{
    field_str, Fields, NormalizedRecord, RecordError, FIELD_END, FIELD_SHAPE, FIELD_START,
    UNKNOWN_RECORD_ID,
};
