//! SQLite-backed repository for observations and recorded differences.
//!
//! The store owns both tables exclusively. All access goes through a single
//! `Mutex<Connection>`, which gives the per-subject serialization the change
//! detection sequence needs: `record_and_diff` performs insert, last-two
//! lookup, diff, and difference write under one lock acquisition, so no
//! concurrent task can interleave a second observation for the same subject
//! between those steps.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::diff;
use crate::signals::{ObservationKind, SignalPayload};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS observations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT NOT NULL,
    kind        TEXT NOT NULL,
    subject_key TEXT NOT NULL,
    payload     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observations_subject
    ON observations (kind, subject_key, id);

CREATE TABLE IF NOT EXISTS differences (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT NOT NULL,
    kind        TEXT NOT NULL,
    subject_key TEXT NOT NULL,
    payload     TEXT NOT NULL,
    difference  TEXT NOT NULL
);
"#;

/// One stored observation row, payload deserialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: i64,
    pub timestamp: String,
    pub kind: ObservationKind,
    pub subject_key: String,
    pub payload: SignalPayload,
}

/// One stored difference row.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceRecord {
    pub id: i64,
    pub timestamp: String,
    pub kind: ObservationKind,
    pub subject_key: String,
    pub payload: SignalPayload,
    pub difference: String,
}

pub struct ObservationStore {
    conn: Mutex<Connection>,
}

impl ObservationStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private database for tests and scratch use.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one observation; the store assigns the monotonic id.
    pub fn insert_observation(
        &self,
        kind: ObservationKind,
        subject_key: &str,
        payload: &SignalPayload,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        Self::insert_with(&conn, kind, subject_key, payload)
    }

    /// The two most recent observations for a subject as `(older, newer)`,
    /// or `None` while fewer than two exist.
    pub fn last_two(
        &self,
        kind: ObservationKind,
        subject_key: &str,
    ) -> Result<Option<(Observation, Observation)>, StoreError> {
        let conn = self.conn.lock();
        Self::last_two_with(&conn, kind, subject_key)
    }

    pub fn append_difference(
        &self,
        kind: ObservationKind,
        subject_key: &str,
        payload: &SignalPayload,
        summary: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        Self::append_difference_with(&conn, kind, subject_key, payload, summary)
    }

    /// Insert an observation, compare it with the previous one for the same
    /// subject, and record a difference when any field changed. Runs under a
    /// single lock acquisition; returns the recorded summary, if any.
    pub fn record_and_diff(
        &self,
        kind: ObservationKind,
        subject_key: &str,
        payload: &SignalPayload,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        Self::insert_with(&conn, kind, subject_key, payload)?;

        let Some((older, newer)) = Self::last_two_with(&conn, kind, subject_key)? else {
            return Ok(None);
        };

        let changes = diff::detect_changes(&older.payload, &newer.payload);
        if changes.is_empty() {
            return Ok(None);
        }

        let summary = diff::summarize(&changes);
        Self::append_difference_with(&conn, kind, subject_key, &newer.payload, &summary)?;
        Ok(Some(summary))
    }

    /// All observations, oldest first. Used by the export collaborator.
    pub fn observations(&self) -> Result<Vec<Observation>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, kind, subject_key, payload FROM observations ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, timestamp, kind, subject_key, payload) = row?;
            out.push(Observation {
                id,
                timestamp,
                kind: parse_kind(&kind)?,
                subject_key,
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(out)
    }

    /// All difference records, oldest first.
    pub fn differences(&self) -> Result<Vec<DifferenceRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, kind, subject_key, payload, difference \
             FROM differences ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, timestamp, kind, subject_key, payload, difference) = row?;
            out.push(DifferenceRecord {
                id,
                timestamp,
                kind: parse_kind(&kind)?,
                subject_key,
                payload: serde_json::from_str(&payload)?,
                difference,
            });
        }
        Ok(out)
    }

    /// Retention: delete every observation except the newest per subject.
    /// Invoked only by the export collaborator, never by the watcher.
    pub fn keep_latest_only(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM observations WHERE id NOT IN (
                 SELECT MAX(id) FROM observations GROUP BY kind, subject_key
             )",
            [],
        )?;
        Ok(deleted)
    }

    /// Empty the differences table. Export-side operation.
    pub fn clear_differences(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM differences", [])?;
        Ok(deleted)
    }

    fn insert_with(
        conn: &Connection,
        kind: ObservationKind,
        subject_key: &str,
        payload: &SignalPayload,
    ) -> Result<i64, StoreError> {
        let json = serde_json::to_string(payload)?;
        conn.execute(
            "INSERT INTO observations (timestamp, kind, subject_key, payload) \
             VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now().to_rfc3339(), kind.as_str(), subject_key, json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn last_two_with(
        conn: &Connection,
        kind: ObservationKind,
        subject_key: &str,
    ) -> Result<Option<(Observation, Observation)>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, kind, subject_key, payload FROM observations \
             WHERE kind = ?1 AND subject_key = ?2 ORDER BY id DESC LIMIT 2",
        )?;
        let rows = stmt.query_map(params![kind.as_str(), subject_key], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut newest_first = Vec::new();
        for row in rows {
            let (id, timestamp, kind, subject_key, payload) = row?;
            newest_first.push(Observation {
                id,
                timestamp,
                kind: parse_kind(&kind)?,
                subject_key,
                payload: serde_json::from_str(&payload)?,
            });
        }

        if newest_first.len() < 2 {
            return Ok(None);
        }
        let newer = newest_first.remove(0);
        let older = newest_first.remove(0);
        Ok(Some((older, newer)))
    }

    fn append_difference_with(
        conn: &Connection,
        kind: ObservationKind,
        subject_key: &str,
        payload: &SignalPayload,
        summary: &str,
    ) -> Result<i64, StoreError> {
        let json = serde_json::to_string(payload)?;
        conn.execute(
            "INSERT INTO differences (timestamp, kind, subject_key, payload, difference) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().to_rfc3339(),
                kind.as_str(),
                subject_key,
                json,
                summary
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn parse_kind(s: &str) -> Result<ObservationKind, StoreError> {
    ObservationKind::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown kind {:?}", s)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}
