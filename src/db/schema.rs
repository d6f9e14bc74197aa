//! Database schema and row types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    turn_count INTEGER NOT NULL DEFAULT 0,
    active_task TEXT,
    state TEXT NOT NULL,
    flow_stack TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);

-- Append-only conversation log, one row per line spoken
CREATE TABLE IF NOT EXISTS turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    turn INTEGER NOT NULL,
    role TEXT NOT NULL,
    task_id TEXT,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, id);
";

/// Longest text kept for a single transcript line, in characters
pub const MAX_TRANSCRIPT_TEXT: usize = 2000;

/// Summary row used for listings; the full record lives in the JSON columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub session_id: String,
    pub turn_count: u64,
    pub active_task: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Who produced a transcript line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    User,
    Agent,
    /// Recovered anomalies, shown to operators only
    System,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Agent => write!(f, "agent"),
            TranscriptRole::System => write!(f, "system"),
        }
    }
}

/// One logged line of a session's conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub session_id: String,
    pub turn: u64,
    pub role: TranscriptRole,
    /// Task that produced an agent line
    pub task_id: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(session_id: impl Into<String>, turn: u64, role: TranscriptRole, text: &str) -> Self {
        let text = match text.char_indices().nth(MAX_TRANSCRIPT_TEXT) {
            Some((idx, _)) => text.get(..idx).unwrap_or(text),
            None => text,
        };
        Self {
            session_id: session_id.into(),
            turn,
            role,
            task_id: None,
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}
