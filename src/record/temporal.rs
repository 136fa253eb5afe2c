//! Temporal validation: is this record describing an in-progress event?

use super::date::parse_datetime;
use super::types::{NormalizedRecord, RecordError, FIELD_END, FIELD_START};
use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// How a report category derives its end time.
///
/// Categories disagree in the source data (a transient traffic condition
/// lasts an hour or a day after detection, roadworks carry explicit end
/// dates), so this is configured per category rather than unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Use `date_fin`; when absent, end `default_hours` after now.
    ExplicitEnd { default_hours: i64 },
    /// End `hours` after the start, ignoring any `date_fin`.
    FromStart { hours: i64 },
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::ExplicitEnd { default_hours: 7 * 24 }
    }
}

/// A resolved `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Open-interval check: `start < now < end`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start < now && now < self.end
    }

    /// The end time truncated to whole seconds, used as report expiry.
    pub fn expiration(&self) -> DateTime<Utc> {
        self.end.with_nanosecond(0).unwrap_or(self.end)
    }
}

/// A record whose window contains the processing time.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub record: NormalizedRecord,
    pub window: TimeWindow,
}

/// Result of temporal validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Active(ValidatedRecord),
    /// Not in progress at processing time (not started, or already over)
    Inactive(TimeWindow),
}

/// Compute the window of a record at processing time `now`.
///
/// `now` carries the feed's civil timezone; date strings without an
/// offset are read in that zone.
pub fn resolve_window(
    record: &NormalizedRecord,
    policy: ExpiryPolicy,
    now: DateTime<Tz>,
) -> Result<TimeWindow, RecordError> {
    let tz = now.timezone();
    let now_utc = now.with_timezone(&Utc);

    let start = read_date(record, FIELD_START, tz)?.unwrap_or(now_utc);
    let end = match policy {
        ExpiryPolicy::ExplicitEnd { default_hours } => read_date(record, FIELD_END, tz)?
            .unwrap_or(now_utc + Duration::hours(default_hours)),
        ExpiryPolicy::FromStart { hours } => start + Duration::hours(hours),
    };

    Ok(TimeWindow { start, end })
}

/// Resolve the window and decide whether the record is in progress.
pub fn validate(
    record: NormalizedRecord,
    policy: ExpiryPolicy,
    now: DateTime<Tz>,
) -> Result<Validation, RecordError> {
    let window = resolve_window(&record, policy, now)?;
    if window.contains(now.with_timezone(&Utc)) {
        Ok(Validation::Active(ValidatedRecord { record, window }))
    } else {
        Ok(Validation::Inactive(window))
    }
}

fn read_date(
    record: &NormalizedRecord,
    key: &str,
    tz: Tz,
) -> Result<Option<DateTime<Utc>>, RecordError> {
    record
        .field(key)
        .map(|value| {
            parse_datetime(value, tz)
                .map_err(|message| RecordError::invalid(&record.record_id, key, message))
        })
        .transpose()
}
