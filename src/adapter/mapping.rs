//! Attribute mapping shared by the adapter families

use crate::record::{
    field_str, from_epoch_millis, quarter_bounds, Fields, RecordError, FIELD_END, FIELD_START,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;

/// Where a record's start or end date comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DateSource {
    /// Already spelled `date_debut` / `date_fin` by the provider, or absent
    Native,
    /// Copy a provider attribute, which must be present (it may be null)
    Field(String),
    /// A millisecond epoch attribute, which must be present and non-empty
    EpochMillis(String),
    /// The calendar quarter containing the processing time
    CurrentQuarter,
}

/// Start and end date sources of one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct DateMapping {
    pub start: DateSource,
    pub end: DateSource,
}

impl Default for DateMapping {
    fn default() -> Self {
        Self::native()
    }
}

impl DateMapping {
    pub fn native() -> Self {
        Self {
            start: DateSource::Native,
            end: DateSource::Native,
        }
    }

    pub fn fields(start: &str, end: &str) -> Self {
        Self {
            start: DateSource::Field(start.to_string()),
            end: DateSource::Field(end.to_string()),
        }
    }

    pub fn epoch_millis(start: &str, end: &str) -> Self {
        Self {
            start: DateSource::EpochMillis(start.to_string()),
            end: DateSource::EpochMillis(end.to_string()),
        }
    }

    pub fn current_quarter() -> Self {
        Self {
            start: DateSource::CurrentQuarter,
            end: DateSource::CurrentQuarter,
        }
    }

    pub fn with_start(mut self, start: DateSource) -> Self {
        self.start = start;
        self
    }

    pub fn with_end(mut self, end: DateSource) -> Self {
        self.end = end;
        self
    }

    /// Write `date_debut` / `date_fin` into `fields`.
    pub fn apply(&self, record_id: &str, fields: &mut Fields, now: DateTime<Tz>) -> Result<(), RecordError> {
        let start = resolve(&self.start, Bound::Start, record_id, fields, now)?;
        let end = resolve(&self.end, Bound::End, record_id, fields, now)?;
        if let Some(start) = start {
            fields.insert(FIELD_START.to_string(), start);
        }
        if let Some(end) = end {
            fields.insert(FIELD_END.to_string(), end);
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn resolve(
    source: &DateSource,
    bound: Bound,
    record_id: &str,
    fields: &Fields,
    now: DateTime<Tz>,
) -> Result<Option<Value>, RecordError> {
    let tz = now.timezone();
    match source {
        DateSource::Native => Ok(None),
        DateSource::Field(key) => require(fields, key, record_id).map(|v| Some(v.clone())),
        DateSource::EpochMillis(key) => {
            let ms = epoch_value(require(fields, key, record_id)?)
                .ok_or_else(|| RecordError::invalid(record_id, key.as_str(), "empty or non-numeric epoch"))?;
            let instant = from_epoch_millis(ms)
                .ok_or_else(|| RecordError::invalid(record_id, key.as_str(), "epoch out of range"))?;
            Ok(Some(local_iso(instant, tz)))
        }
        DateSource::CurrentQuarter => {
            let (start, end) = quarter_bounds(now);
            let instant = match bound {
                Bound::Start => start,
                Bound::End => end,
            };
            Ok(Some(local_iso(instant, tz)))
        }
    }
}

fn epoch_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
}

/// ISO-8601 with the local offset, the form providers themselves use.
pub(crate) fn local_iso(instant: DateTime<Utc>, tz: Tz) -> Value {
    Value::String(instant.with_timezone(&tz).to_rfc3339())
}

/// A required attribute. Null counts as present.
pub(crate) fn require<'a>(fields: &'a Fields, key: &str, record_id: &str) -> Result<&'a Value, RecordError> {
    fields
        .get(key)
        .ok_or_else(|| RecordError::missing(record_id, key))
}

/// A required attribute holding a JSON object.
pub(crate) fn require_object<'a>(fields: &'a Fields, key: &str, record_id: &str) -> Result<&'a Fields, RecordError> {
    require(fields, key, record_id)?
        .as_object()
        .ok_or_else(|| RecordError::invalid(record_id, key, "expected an object"))
}

/// A required identifier attribute, rendered as a string.
pub(crate) fn require_id(fields: &Fields, key: &str, record_id: &str) -> Result<String, RecordError> {
    field_str(require(fields, key, record_id)?)
        .ok_or_else(|| RecordError::invalid(record_id, key, "empty identifier"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;
    use serde_json::json;

    fn now() -> DateTime<Tz> {
        Paris.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap()
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn field_dates_are_copied() {
        let mut f = fields(json!({"datedebut": "2026-10-01", "datefin": null}));
        DateMapping::fields("datedebut", "datefin")
            .apply("1", &mut f, now())
            .unwrap();
        assert_eq!(f[FIELD_START], json!("2026-10-01"));
        assert_eq!(f[FIELD_END], Value::Null);
    }

    #[test]
    fn missing_field_names_the_key() {
        let mut f = fields(json!({"datedebut": "2026-10-01"}));
        let err = DateMapping::fields("datedebut", "datefin")
            .apply("42", &mut f, now())
            .unwrap_err();
        assert_eq!(err, RecordError::missing("42", "datefin"));
    }

    #[test]
    fn epoch_dates_render_in_local_time() {
        let mut f = fields(json!({"STARTDATE": 1_790_000_000_000i64, "ENDDATE": "1790086400000"}));
        DateMapping::epoch_millis("STARTDATE", "ENDDATE")
            .apply("7", &mut f, now())
            .unwrap();
        assert_eq!(f[FIELD_START], json!("2026-09-21T16:13:20+02:00"));
        assert_eq!(f[FIELD_END], json!("2026-09-22T16:13:20+02:00"));
    }

    #[test]
    fn empty_epoch_is_invalid() {
        let mut f = fields(json!({"DATE_DEBUT": null, "DATE_FIN": 1_790_000_000_000i64}));
        let err = DateMapping::epoch_millis("DATE_DEBUT", "DATE_FIN")
            .apply("3", &mut f, now())
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidField { ref key, .. } if key == "DATE_DEBUT"));
    }

    #[test]
    fn quarter_dates_bracket_now() {
        let mut f = Fields::new();
        DateMapping::current_quarter().apply("q", &mut f, now()).unwrap();
        assert_eq!(f[FIELD_START], json!("2026-10-01T00:00:00+02:00"));
        assert_eq!(f[FIELD_END], json!("2027-01-01T00:00:00+01:00"));
    }

    #[test]
    fn native_dates_are_left_alone() {
        let mut f = fields(json!({"date_debut": "2026-10-01"}));
        DateMapping::native().apply("n", &mut f, now()).unwrap();
        assert_eq!(f.len(), 1);
    }
}
