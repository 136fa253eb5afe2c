//! Date decoding for provider attributes
//!
//! Three raw encodings are accepted: ISO-8601 strings, slash-delimited
//! date strings (separator normalized before parsing) and millisecond
//! epoch numbers. Strings without an offset are local civil time in the
//! feed's timezone.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y"];

/// Decode a date attribute.
pub fn parse_datetime(value: &Value, tz: Tz) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(from_epoch_millis)
            .ok_or_else(|| format!("epoch value out of range: {}", n)),
        Value::String(s) => parse_date_str(s, tz),
        other => Err(format!("not a date: {}", other)),
    }
}

/// Millisecond epoch to instant.
pub fn from_epoch_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    let secs = (ms / 1000.0).floor();
    let nanos = ((ms / 1000.0 - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// `YYYYMMDDHHmmss` in local time.
pub fn parse_compact_local(s: &str, tz: Tz) -> Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y%m%d%H%M%S")
        .map_err(|e| format!("{}: {}", s, e))?;
    localize(naive, tz)
}

/// First instant of the calendar quarter containing `now`, and of the next one.
pub fn quarter_bounds(now: DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let first_month = (now.month0() / 3) * 3 + 1;
    let (next_year, next_month) = if first_month == 10 {
        (now.year() + 1, 1)
    } else {
        (now.year(), first_month + 3)
    };
    let start = month_start(now.year(), first_month, tz);
    let end = month_start(next_year, next_month, tz);
    (start, end)
}

fn month_start(year: i32, month: u32, tz: Tz) -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    localize(naive, tz).unwrap_or_else(|_| Utc.from_utc_datetime(&naive))
}

fn parse_date_str(raw: &str, tz: Tz) -> Result<DateTime<Utc>, String> {
    let s = raw.trim().replace('/', "-");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, format) {
            return localize(naive, tz);
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&s, format) {
            return localize(date.and_hms_opt(0, 0, 0).unwrap_or_default(), tz);
        }
    }
    Err(format!("unrecognized date: {}", raw))
}

fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, String> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("{} does not exist in {}", naive, tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Paris;
    use serde_json::json;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn iso_with_offset() {
        let dt = parse_datetime(&json!("2018-05-01T10:00:00+02:00"), Paris).unwrap();
        assert_eq!(dt, utc("2018-05-01T08:00:00Z"));
    }

    #[test]
    fn naive_iso_is_local_time() {
        // Paris is UTC+1 in January.
        let dt = parse_datetime(&json!("2018-01-15T12:00:00"), Paris).unwrap();
        assert_eq!(dt, utc("2018-01-15T11:00:00Z"));
    }

    #[test]
    fn slash_dates_are_normalized() {
        let dt = parse_datetime(&json!("2018/07/01"), Paris).unwrap();
        assert_eq!(dt, utc("2018-06-30T22:00:00Z"));
    }

    #[test]
    fn epoch_millis() {
        let dt = parse_datetime(&json!(1_525_168_800_000i64), Paris).unwrap();
        assert_eq!(dt, utc("2018-05-01T10:00:00Z"));
        assert_eq!(from_epoch_millis(1500.0).unwrap().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_datetime(&json!("next tuesday"), Paris).is_err());
        assert!(parse_datetime(&json!(true), Paris).is_err());
    }

    #[test]
    fn compact_local_time() {
        let dt = parse_compact_local("20180501103000", Paris).unwrap();
        assert_eq!(dt, utc("2018-05-01T08:30:00Z"));
    }

    #[test]
    fn quarter_bounds_roll_over_the_year() {
        let now = Paris.with_ymd_and_hms(2026, 11, 3, 9, 0, 0).unwrap();
        let (start, end) = quarter_bounds(now);
        assert_eq!(start, utc("2026-09-30T22:00:00Z"));
        assert_eq!(end, utc("2026-12-31T23:00:00Z"));
    }

    #[test]
    fn quarter_bounds_first_quarter() {
        let now = Paris.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap();
        let (start, end) = quarter_bounds(now);
        assert_eq!(start, utc("2025-12-31T23:00:00Z"));
        assert_eq!(end, utc("2026-03-31T22:00:00Z"));
    }
}
