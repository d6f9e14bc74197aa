//! Trait abstractions for runtime I/O
//!
//! Session persistence and the conversation transcript sit behind
//! [`SessionStore`] so the manager can be tested with an in-memory store.

use crate::db::{Database, TranscriptEntry};
use crate::state_machine::{FlowStack, SessionState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything persisted for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub state: SessionState,
    pub stack: FlowStack,
}

impl SessionRecord {
    pub fn new(state: SessionState, stack: FlowStack) -> Self {
        Self { state, stack }
    }

    pub fn session_id(&self) -> &str {
        self.state.session_id()
    }
}

/// Storage for session state and the flow stack
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String>;

    /// Insert or replace the record
    async fn save(&self, record: &SessionRecord) -> Result<(), String>;

    /// Delete the record and its transcript. Returns whether a record existed.
    async fn delete(&self, session_id: &str) -> Result<bool, String>;

    async fn append_transcript(&self, entries: &[TranscriptEntry]) -> Result<(), String>;

    /// Oldest line first
    async fn transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, String>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String> {
        (**self).load(session_id).await
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), String> {
        (**self).save(record).await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, String> {
        (**self).delete(session_id).await
    }

    async fn append_transcript(&self, entries: &[TranscriptEntry]) -> Result<(), String> {
        (**self).append_transcript(entries).await
    }

    async fn transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, String> {
        (**self).transcript(session_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `SessionStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn inner(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String> {
        self.db.load_session(session_id).map_err(|e| e.to_string())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), String> {
        self.db.save_session(record).map_err(|e| e.to_string())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, String> {
        self.db.delete_session(session_id).map_err(|e| e.to_string())
    }

    async fn append_transcript(&self, entries: &[TranscriptEntry]) -> Result<(), String> {
        self.db.append_transcript(entries).map_err(|e| e.to_string())
    }

    async fn transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, String> {
        self.db.get_transcript(session_id).map_err(|e| e.to_string())
    }
}
