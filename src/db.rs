//! Database module
//!
//! Persists session state and the flow stack as JSON columns, with the turn
//! counter and active task mirrored into plain columns for listings. The
//! `turns` table is an append-only transcript of every session.

mod schema;

pub use schema::*;

use crate::runtime::SessionRecord;
use crate::state_machine::TaskId;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt session record {session_id}: {source}")]
    Corrupt {
        session_id: String,
        source: serde_json::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Insert or replace a session record
    pub fn save_session(&self, record: &SessionRecord) -> DbResult<()> {
        let state = serde_json::to_string(&record.state)?;
        let stack = serde_json::to_string(&record.stack)?;
        let now = Utc::now().to_rfc3339();
        let turn_count = i64::try_from(record.state.turn_count()).unwrap_or(i64::MAX);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (session_id, turn_count, active_task, state, flow_stack, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(session_id) DO UPDATE SET
                turn_count = excluded.turn_count,
                active_task = excluded.active_task,
                state = excluded.state,
                flow_stack = excluded.flow_stack,
                updated_at = excluded.updated_at",
            params![
                record.session_id(),
                turn_count,
                record.state.active_task().map(TaskId::as_str),
                state,
                stack,
                now
            ],
        )?;
        Ok(())
    }

    pub fn load_session(&self, session_id: &str) -> DbResult<Option<SessionRecord>> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT state, flow_stack FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((state, stack)) = row else {
            return Ok(None);
        };
        let corrupt = |source| DbError::Corrupt {
            session_id: session_id.to_string(),
            source,
        };
        Ok(Some(SessionRecord {
            state: serde_json::from_str(&state).map_err(corrupt)?,
            stack: serde_json::from_str(&stack).map_err(corrupt)?,
        }))
    }

    /// Delete the session and its transcript. Returns whether the session row existed.
    pub fn delete_session(&self, session_id: &str) -> DbResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM turns WHERE session_id = ?1", params![session_id])?;
        let deleted = tx.execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Sessions ordered by most recent activity
    pub fn list_sessions(&self) -> DbResult<Vec<SessionRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, turn_count, active_task, updated_at
             FROM sessions ORDER BY updated_at DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRow {
                    session_id: row.get(0)?,
                    turn_count: u64::try_from(row.get::<_, i64>(1)?).unwrap_or_default(),
                    active_task: row.get(2)?,
                    updated_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ==================== Transcript Operations ====================

    /// Append transcript lines atomically, in order
    pub fn append_transcript(&self, entries: &[TranscriptEntry]) -> DbResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT INTO turns (session_id, turn, role, task_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.session_id,
                    i64::try_from(entry.turn).unwrap_or(i64::MAX),
                    entry.role.to_string(),
                    entry.task_id,
                    entry.text,
                    entry.created_at.to_rfc3339()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Transcript of a session, oldest line first
    pub fn get_transcript(&self, session_id: &str) -> DbResult<Vec<TranscriptEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, turn, role, task_id, text, created_at
             FROM turns WHERE session_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(TranscriptEntry {
                    session_id: row.get(0)?,
                    turn: u64::try_from(row.get::<_, i64>(1)?).unwrap_or_default(),
                    role: parse_role(&row.get::<_, String>(2)?),
                    task_id: row.get(3)?,
                    text: row.get(4)?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn parse_role(s: &str) -> TranscriptRole {
    match s {
        "user" => TranscriptRole::User,
        "agent" => TranscriptRole::Agent,
        _ => TranscriptRole::System,
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{ActiveTaskChange, ContextMap, FlowFrame, FlowStack, SessionState};
    use serde_json::json;
    use std::num::NonZeroUsize;

    fn sample_record(id: &str) -> SessionRecord {
        let mut state = SessionState::new(id);
        let mut entries = ContextMap::new();
        entries.insert("plan_day".to_string(), json!("monday"));
        state.update(entries.clone(), ActiveTaskChange::Keep);
        state.finish_turn(Some("health_monitor".into()), "log glucose".to_string());

        let mut stack = FlowStack::new(NonZeroUsize::new(3).unwrap());
        stack
            .push(FlowFrame::new("planner".into(), "plan my meals", entries, 0))
            .unwrap();
        SessionRecord::new(state, stack)
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let record = sample_record("s-1");

        db.save_session(&record).unwrap();

        assert_eq!(db.load_session("s-1").unwrap(), Some(record));
        assert_eq!(db.load_session("missing").unwrap(), None);
    }

    #[test]
    fn test_save_replaces_existing() {
        let db = Database::open_in_memory().unwrap();
        let mut record = sample_record("s-1");
        db.save_session(&record).unwrap();

        record.state.finish_turn(None, "thanks".to_string());
        record.stack.clear();
        db.save_session(&record).unwrap();

        let loaded = db.load_session("s-1").unwrap().unwrap();
        assert_eq!(loaded.state.turn_count(), 2);
        assert!(loaded.stack.is_empty());

        let rows = db.list_sessions().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].turn_count, 2);
        assert_eq!(rows[0].active_task, None);
    }

    #[test]
    fn test_delete_session() {
        let db = Database::open_in_memory().unwrap();
        db.save_session(&sample_record("s-1")).unwrap();

        assert!(db.delete_session("s-1").unwrap());
        assert!(!db.delete_session("s-1").unwrap());
        assert!(db.load_session("s-1").unwrap().is_none());
    }

    #[test]
    fn test_transcript_append_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.save_session(&sample_record("s-1")).unwrap();
        db.append_transcript(&[
            TranscriptEntry::new("s-1", 0, TranscriptRole::User, "plan my meals"),
            TranscriptEntry::new("s-1", 0, TranscriptRole::Agent, "Which days?").with_task("planner"),
        ])
        .unwrap();
        db.append_transcript(&[TranscriptEntry::new("other", 0, TranscriptRole::User, "hi")])
            .unwrap();

        let lines = db.get_transcript("s-1").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].role, TranscriptRole::User);
        assert_eq!(lines[1].task_id.as_deref(), Some("planner"));
        assert_eq!(lines[1].text, "Which days?");

        assert!(db.delete_session("s-1").unwrap());
        assert!(db.get_transcript("s-1").unwrap().is_empty());
        assert_eq!(db.get_transcript("other").unwrap().len(), 1);
    }

    #[test]
    fn test_transcript_text_is_capped() {
        let long = "é".repeat(MAX_TRANSCRIPT_TEXT + 10);
        let entry = TranscriptEntry::new("s-1", 0, TranscriptRole::User, &long);
        assert_eq!(entry.text.chars().count(), MAX_TRANSCRIPT_TEXT);
    }

    #[test]
    fn test_corrupt_record_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.save_session(&sample_record("s-1")).unwrap();
        db.lock()
            .unwrap()
            .execute("UPDATE sessions SET flow_stack = 'not json' WHERE session_id = 's-1'", [])
            .unwrap();

        assert!(matches!(db.load_session("s-1"), Err(DbError::Corrupt { .. })));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");

        {
            let db = Database::open(&path).unwrap();
            db.save_session(&sample_record("s-1")).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let loaded = db.load_session("s-1").unwrap().unwrap();
        assert_eq!(loaded.stack.task_ids()[0].as_str(), "planner");
        assert_eq!(loaded.state.last_input(), Some("log glucose"));
    }
}
