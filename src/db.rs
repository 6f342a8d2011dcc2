//! Alert & snapshot database — SQLite persistence.
//!
//! Stores fired alerts and periodic occupancy snapshots. The engine
//! treats this as an optional collaborator: every write failure is
//! reported as an error for the caller to log and discard, never to
//! propagate into the frame loop.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::alerts::{AlertRecord, AlertSink};
use crate::occupancy::Summary;

/// A persisted alert row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub message: String,
    pub occupancy: Option<i32>,
    pub meta: serde_json::Value,
}

/// A persisted occupancy snapshot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub occupancy: i64,
    pub unique_count: i64,
    pub longest_dwell: i64,
    pub note: Option<String>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        // Resolve bare filenames to local app data
        let resolved = resolve_db_path(path);
        let conn = Connection::open(&resolved)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS alerts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT    NOT NULL,
                kind        TEXT    NOT NULL,
                message     TEXT    NOT NULL,
                occupancy   INTEGER,
                meta        TEXT    NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS occupancy_snapshots (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp     TEXT    NOT NULL,
                occupancy     INTEGER NOT NULL,
                unique_count  INTEGER NOT NULL,
                longest_dwell INTEGER NOT NULL,
                note          TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_ts    ON alerts (timestamp);
            CREATE INDEX IF NOT EXISTS idx_alerts_kind  ON alerts (kind);
            CREATE INDEX IF NOT EXISTS idx_snapshots_ts ON occupancy_snapshots (timestamp);
        ",
        )?;
        Ok(())
    }

    /// Most recent alerts, newest first.
    pub fn recent_alerts(&self, limit: u32) -> Result<Vec<StoredAlert>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, kind, message, occupancy, meta
             FROM alerts ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let ts: String = row.get(1)?;
            let meta_text: String = row.get(5)?;
            Ok(StoredAlert {
                id: row.get(0)?,
                timestamp: parse_ts(&ts),
                kind: row.get(2)?,
                message: row.get(3)?,
                occupancy: row.get(4)?,
                meta: serde_json::from_str(&meta_text)
                    .unwrap_or(serde_json::Value::Object(Default::default())),
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent occupancy snapshots, newest first.
    pub fn recent_snapshots(&self, limit: u32) -> Result<Vec<StoredSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, occupancy, unique_count, longest_dwell, note
             FROM occupancy_snapshots ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let ts: String = row.get(1)?;
            Ok(StoredSnapshot {
                id: row.get(0)?,
                timestamp: parse_ts(&ts),
                occupancy: row.get(2)?,
                unique_count: row.get(3)?,
                longest_dwell: row.get(4)?,
                note: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Alert count per kind over the last `hours` hours.
    pub fn alert_counts(&self, hours: u32) -> Result<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) as cnt FROM alerts
             WHERE timestamp > datetime('now', ?1)
             GROUP BY kind ORDER BY cnt DESC",
        )?;
        let rows = stmt.query_map(params![format!("-{} hours", hours)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

impl AlertSink for Database {
    fn insert_alert(&self, record: &AlertRecord) -> Result<()> {
        let meta = serde_json::Value::Object(record.meta.clone());
        self.conn.execute(
            "INSERT INTO alerts (timestamp, kind, message, occupancy, meta)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.time.to_rfc3339(),
                record.kind.as_str(),
                record.message,
                record.occupancy,
                meta.to_string(),
            ],
        )?;
        Ok(())
    }

    fn insert_snapshot(&self, summary: &Summary, note: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO occupancy_snapshots
             (timestamp, occupancy, unique_count, longest_dwell, note)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().to_rfc3339(),
                summary.current as i64,
                summary.unique as i64,
                summary.longest_dwell,
                note,
            ],
        )?;
        Ok(())
    }
}

fn parse_ts(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Resolve bare DB filenames to local app data directory.
fn resolve_db_path(db_path: &str) -> String {
    if Path::new(db_path).is_absolute() {
        return db_path.to_string();
    }
    if let Some(data_dir) = dirs::data_local_dir() {
        let full = data_dir.join("zonewatch").join(db_path);
        if let Some(parent) = full.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        return full.to_string_lossy().to_string();
    }
    db_path.to_string()
}
