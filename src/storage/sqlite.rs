//! SQLite report store

use super::traits::{
    ActiveReport, ActiveReportQuery, CanonicalReport, NewReport, OpenStore, ReportWriter,
    StorageError, StorageResult, DEFAULT_DOWNVOTES_THRESHOLD,
};
use chrono::{DateTime, Timelike, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed report store
///
/// One `reports` table. Thread-safe via internal mutex on the connection.
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
    downvotes_threshold: i64,
}

impl SqliteReportStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                datetime TEXT NOT NULL,
                expiration_datetime TEXT,
                source TEXT NOT NULL DEFAULT 'unknown',
                shape_geojson TEXT,
                upvotes INTEGER NOT NULL DEFAULT 0,
                downvotes INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_reports_type
                ON reports(type, expiration_datetime);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            downvotes_threshold: DEFAULT_DOWNVOTES_THRESHOLD,
        })
    }

    /// Override the downvote count at which a non-expiring report goes inactive.
    pub fn with_downvotes_threshold(mut self, threshold: i64) -> Self {
        self.downvotes_threshold = threshold;
        self
    }

    /// Load one report by id
    pub fn get(&self, id: i64) -> StorageResult<Option<CanonicalReport>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {} FROM reports WHERE id = ?1", REPORT_COLUMNS),
            params![id],
            Self::row_to_raw,
        )
        .optional()?
        .map(RawReport::into_report)
        .transpose()
    }

    /// All reports of one type, oldest first
    pub fn list(&self, report_type: &str) -> StorageResult<Vec<CanonicalReport>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reports WHERE type = ?1 ORDER BY id",
            REPORT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![report_type], Self::row_to_raw)?;
        let mut reports = Vec::new();
        for raw in rows {
            reports.push(raw?.into_report()?);
        }
        Ok(reports)
    }

    /// Total number of stored reports
    pub fn count(&self) -> StorageResult<usize> {
        let conn = self.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawReport> {
        Ok(RawReport {
            id: row.get(0)?,
            report_type: row.get(1)?,
            lat: row.get(2)?,
            lng: row.get(3)?,
            datetime: row.get(4)?,
            expiration: row.get(5)?,
            source: row.get(6)?,
            shape_geojson: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            upvotes: row.get(8)?,
            downvotes: row.get(9)?,
        })
    }
}

const REPORT_COLUMNS: &str =
    "id, type, lat, lng, datetime, expiration_datetime, source, shape_geojson, upvotes, downvotes";

/// Column values before date parsing
struct RawReport {
    id: i64,
    report_type: String,
    lat: f64,
    lng: f64,
    datetime: String,
    expiration: Option<String>,
    source: String,
    shape_geojson: String,
    upvotes: i64,
    downvotes: i64,
}

impl RawReport {
    fn into_report(self) -> StorageResult<CanonicalReport> {
        Ok(CanonicalReport {
            id: self.id,
            report_type: self.report_type,
            lat: self.lat,
            lng: self.lng,
            datetime: parse_timestamp(&self.datetime)?,
            expiration_time: self.expiration.as_deref().map(parse_timestamp).transpose()?,
            source: self.source,
            shape_geojson: self.shape_geojson,
            upvotes: self.upvotes,
            downvotes: self.downvotes,
        })
    }
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{}: {}", s, e)))
}

/// Timestamps are stored as RFC 3339 UTC strings with whole seconds, so
/// lexical order in SQL matches chronological order.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.with_nanosecond(0)
        .unwrap_or(dt)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

impl OpenStore for SqliteReportStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }
}

impl ActiveReportQuery for SqliteReportStore {
    // Stored expirations are whole seconds, so comparing them against `now`
    // truncated to the second gives the same answer as comparing against
    // `now` itself. Sub-second precision is dropped at write time.
    fn query_active(&self, report_type: &str, now: DateTime<Utc>) -> StorageResult<Vec<ActiveReport>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT lat, lng, downvotes, expiration_datetime FROM reports
            WHERE type = ?1 AND (
                (expiration_datetime IS NOT NULL AND expiration_datetime > ?2)
                OR (expiration_datetime IS NULL AND downvotes < ?3)
            )
            "#,
        )?;
        let rows = stmt.query_map(
            params![report_type, format_timestamp(now), self.downvotes_threshold],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )?;

        let mut active = Vec::new();
        for row in rows {
            let (lat, lng, downvotes, expiration) = row?;
            active.push(ActiveReport {
                lat,
                lng,
                downvotes,
                expiration_time: expiration.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(active)
    }
}

impl ReportWriter for SqliteReportStore {
    fn create(&self, report: NewReport) -> StorageResult<CanonicalReport> {
        let datetime = Utc::now().with_nanosecond(0).unwrap_or_else(Utc::now);
        let expiration_time = report.expiration_time.map(|e| e.with_nanosecond(0).unwrap_or(e));

        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO reports (type, lat, lng, datetime, expiration_datetime, source, shape_geojson)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                report.report_type,
                report.lat,
                report.lng,
                format_timestamp(datetime),
                expiration_time.map(format_timestamp),
                report.source,
                report.shape_geojson,
            ],
        )?;

        Ok(CanonicalReport {
            id: conn.last_insert_rowid(),
            report_type: report.report_type,
            lat: report.lat,
            lng: report.lng,
            datetime,
            expiration_time,
            source: report.source,
            shape_geojson: report.shape_geojson,
            upvotes: 0,
            downvotes: 0,
        })
    }
}
