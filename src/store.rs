// 🗄️ Reading Store - append-only (date, source) → (high, low) log
//
// Writers only ever INSERT. Reconciliation of repeated writes happens on
// read (see `deduplication`), so a writer never has to read first and a
// crash mid-run leaves at worst one fewer row, never a half-updated one.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::deduplication;
use crate::error::StoreWriteError;
use crate::reading::{from_stored, Reading};

// ============================================================================
// RAW RECORD
// ============================================================================

/// RawRecord - one physical append, before deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Append order (monotonically increasing)
    pub seq: i64,

    pub reading: Reading,

    /// When the append happened
    pub recorded_at: DateTime<Utc>,

    /// Capture run that produced the record (None for manual ingestion)
    pub run_id: Option<Uuid>,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// ReadingStore - what the pipeline and the reports need from storage
///
/// Each `append` is independent and durable on return. There are no
/// multi-key transactions.
pub trait ReadingStore {
    /// Persist one reading, returning its append sequence
    fn append(&mut self, reading: &Reading, run_id: Option<Uuid>) -> Result<i64, StoreWriteError>;

    /// Every append, in append order
    fn raw_records(&self) -> Result<Vec<RawRecord>>;

    /// Deduplicated view: latest append per (date, source), sorted by date then source
    fn materialize(&self) -> Result<Vec<Reading>> {
        Ok(deduplication::collapse(&self.raw_records()?))
    }
}

// ============================================================================
// RUN EVENTS (audit trail)
// ============================================================================

/// Event for the capture audit trail: one row per source per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub source: String,
    pub status: String,
    pub message: Option<String>,
    pub document_sha256: Option<String>,
    pub data: serde_json::Value,
}

// ============================================================================
// SQLITE BACKEND
// ============================================================================

pub struct SqliteReadingStore {
    conn: Connection,
}

impl SqliteReadingStore {
    /// Open (or create) a database file
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        Self::from_connection(conn)
    }

    /// Throwaway database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteReadingStore { conn })
    }

    /// Number of physical appends (duplicates included)
    pub fn count_raw(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Write the outcome of a capture run to the audit trail
    pub fn insert_run_events(&self, events: &[RunEvent]) -> Result<usize, StoreWriteError> {
        let mut written = 0;
        for event in events {
            let data_json = serde_json::to_string(&event.data)?;
            self.conn.execute(
                "INSERT INTO run_events (
                    run_id, timestamp, date, source, status, message, document_sha256, data
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.run_id.to_string(),
                    event.timestamp.to_rfc3339(),
                    event.date.to_string(),
                    event.source,
                    event.status,
                    event.message,
                    event.document_sha256,
                    data_json,
                ],
            )?;
            written += 1;
        }
        Ok(written)
    }

    /// Audit trail of one run, in insertion order
    pub fn run_events(&self, run_id: Uuid) -> Result<Vec<RunEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, timestamp, date, source, status, message, document_sha256, data
             FROM run_events
             WHERE run_id = ?1
             ORDER BY id ASC",
        )?;

        let events = stmt
            .query_map(params![run_id.to_string()], row_to_run_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Most recent failure events for `source`, newest first
    pub fn recent_failures(&self, source: &str, limit: usize) -> Result<Vec<RunEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, timestamp, date, source, status, message, document_sha256, data
             FROM run_events
             WHERE source = ?1 AND status <> 'stored'
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let events = stmt
            .query_map(params![source, limit as i64], row_to_run_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

impl ReadingStore for SqliteReadingStore {
    fn append(&mut self, reading: &Reading, run_id: Option<Uuid>) -> Result<i64, StoreWriteError> {
        // Absent values go in as NaN; SQLite stores NaN as NULL
        self.conn.execute(
            "INSERT INTO readings (date, source, high_temp, low_temp, recorded_at, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                reading.date.to_string(),
                reading.source,
                reading.stored_high(),
                reading.stored_low(),
                Utc::now().to_rfc3339(),
                run_id.map(|id| id.to_string()),
            ],
        )?;

        let seq = self.conn.last_insert_rowid();
        debug!(seq, date = %reading.date, source = %reading.source, "appended reading");
        Ok(seq)
    }

    fn raw_records(&self) -> Result<Vec<RawRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, date, source, high_temp, low_temp, recorded_at, run_id
             FROM readings
             ORDER BY seq ASC",
        )?;

        let records = stmt
            .query_map([], row_to_raw_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Readings Table (append-only; high/low NULL when absent)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS readings (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            source TEXT NOT NULL,
            high_temp REAL,
            low_temp REAL,
            recorded_at TEXT NOT NULL,
            run_id TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Run Events Table (capture audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS run_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            date TEXT NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT,
            document_sha256 TEXT,
            data TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_readings_key ON readings(date, source)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_run_events_run ON run_events(run_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_run_events_source ON run_events(source)",
        [],
    )?;

    Ok(())
}

fn row_to_raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    let date_str: String = row.get(1)?;
    let source: String = row.get(2)?;
    let high: Option<f64> = row.get(3)?;
    let low: Option<f64> = row.get(4)?;
    let recorded_at_str: String = row.get(5)?;
    let run_id_str: Option<String> = row.get(6)?;

    let run_id = match run_id_str {
        Some(s) => Some(Uuid::parse_str(&s).map_err(|e| conversion_error(6, e))?),
        None => None,
    };

    Ok(RawRecord {
        seq: row.get(0)?,
        reading: Reading::new(
            parse_date(1, &date_str)?,
            &source,
            high.and_then(from_stored),
            low.and_then(from_stored),
        ),
        recorded_at: parse_timestamp(5, &recorded_at_str)?,
        run_id,
    })
}

fn row_to_run_event(row: &Row<'_>) -> rusqlite::Result<RunEvent> {
    let run_id_str: String = row.get(0)?;
    let timestamp_str: String = row.get(1)?;
    let date_str: String = row.get(2)?;
    let data_json: String = row.get(7)?;

    Ok(RunEvent {
        run_id: Uuid::parse_str(&run_id_str).map_err(|e| conversion_error(0, e))?,
        timestamp: parse_timestamp(1, &timestamp_str)?,
        date: parse_date(2, &date_str)?,
        source: row.get(3)?,
        status: row.get(4)?,
        message: row.get(5)?,
        document_sha256: row.get(6)?,
        data: serde_json::from_str(&data_json).map_err(|e| conversion_error(7, e))?,
    })
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_date(column: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    value
        .parse::<NaiveDate>()
        .map_err(|e| conversion_error(column, e))
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn store() -> SqliteReadingStore {
        SqliteReadingStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_append_assigns_increasing_seq() {
        let mut store = store();
        let a = store
            .append(&Reading::new(day(1), "wetter_com", Some(10.0), Some(2.0)), None)
            .unwrap();
        let b = store
            .append(&Reading::new(day(1), "wetter_net", Some(11.0), Some(3.0)), None)
            .unwrap();
        assert!(b > a);
        assert_eq!(store.count_raw().unwrap(), 2);
    }

    #[test]
    fn test_materialize_last_write_wins() {
        let mut store = store();
        store
            .append(&Reading::new(day(1), "wetter_com", Some(10.0), Some(2.0)), None)
            .unwrap();
        store
            .append(&Reading::new(day(1), "wetter_com", Some(14.0), Some(4.0)), None)
            .unwrap();

        let readings = store.materialize().unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].high, Some(14.0));
        assert_eq!(readings[0].low, Some(4.0));
        // raw log still holds both appends
        assert_eq!(store.count_raw().unwrap(), 2);
    }

    #[test]
    fn test_idempotent_double_append() {
        let reading = Reading::new(day(2), "stadt_reutlingen", Some(20.0), Some(8.0));

        let mut once = store();
        once.append(&reading, None).unwrap();

        let mut twice = store();
        twice.append(&reading, None).unwrap();
        twice.append(&reading, None).unwrap();

        assert_eq!(once.materialize().unwrap(), twice.materialize().unwrap());
    }

    #[test]
    fn test_absent_values_survive_storage() {
        let mut store = store();
        store
            .append(&Reading::new(day(3), "home_assistant", None, Some(-4.5)), None)
            .unwrap();

        let readings = store.materialize().unwrap();
        assert_eq!(readings[0].high, None);
        assert_eq!(readings[0].low, Some(-4.5));
    }

    #[test]
    fn test_run_id_is_persisted() {
        let mut store = store();
        let run_id = Uuid::new_v4();
        store
            .append(&Reading::new(day(1), "wetter_com", Some(1.0), Some(0.0)), Some(run_id))
            .unwrap();

        let raw = store.raw_records().unwrap();
        assert_eq!(raw[0].run_id, Some(run_id));
    }

    #[test]
    fn test_run_events_roundtrip() {
        let store = store();
        let run_id = Uuid::new_v4();
        let events = vec![
            RunEvent {
                run_id,
                timestamp: Utc::now(),
                date: day(5),
                source: "wetter_com".to_string(),
                status: "stored".to_string(),
                message: None,
                document_sha256: Some("ab".repeat(32)),
                data: serde_json::json!({"high": 12, "low": 3}),
            },
            RunEvent {
                run_id,
                timestamp: Utc::now(),
                date: day(5),
                source: "wetter_net".to_string(),
                status: "extraction_failed".to_string(),
                message: Some("no element matches".to_string()),
                document_sha256: None,
                data: serde_json::json!({}),
            },
        ];

        assert_eq!(store.insert_run_events(&events).unwrap(), 2);

        let loaded = store.run_events(run_id).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].source, "wetter_com");
        assert_eq!(loaded[1].status, "extraction_failed");

        let failures = store.recent_failures("wetter_net", 5).unwrap();
        assert_eq!(failures.len(), 1);
        assert!(store.recent_failures("wetter_com", 5).unwrap().is_empty());
    }

    #[test]
    fn test_recent_failures_returns_each_event_once() {
        let store = store();
        let run_id = Uuid::new_v4();
        // same source configured twice, both rows failed in one run
        let failed = |locator: &str| RunEvent {
            run_id,
            timestamp: Utc::now(),
            date: day(6),
            source: "wetter_com".to_string(),
            status: "fetch_failed".to_string(),
            message: Some(format!("{} answered with HTTP 503", locator)),
            document_sha256: None,
            data: serde_json::json!({ "locator": locator }),
        };
        store
            .insert_run_events(&[failed("https://a.example"), failed("https://b.example")])
            .unwrap();

        let failures = store.recent_failures("wetter_com", 10).unwrap();
        assert_eq!(failures.len(), 2);
        // newest first
        assert_eq!(failures[0].data["locator"], "https://b.example");
        assert_eq!(failures[1].data["locator"], "https://a.example");

        assert_eq!(store.recent_failures("wetter_com", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.db");

        {
            let mut store = SqliteReadingStore::open(&path).unwrap();
            store
                .append(&Reading::new(day(1), "wetter_com", Some(9.0), Some(1.0)), None)
                .unwrap();
        }

        let reopened = SqliteReadingStore::open(&path).unwrap();
        assert_eq!(reopened.materialize().unwrap().len(), 1);
    }
}
