//! Session runtime
//!
//! Each live session is owned by one tokio task that drains an inbound
//! queue, so turns for a session run strictly one after another while
//! different sessions proceed independently. The worker persists the
//! session and appends to its transcript after every turn.

mod controller;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use controller::{FlowController, FlowError, TurnOutcome};
pub use traits::*;

use crate::db::{TranscriptEntry, TranscriptRole};
use crate::state_machine::{ContextMap, SessionState, TaskId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Manager backed by the SQLite store
pub type ProductionManager = SessionManager<DatabaseStorage>;

const SESSION_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session {0} is being closed")]
    SessionClosing(String),
    #[error("Session worker for {0} has stopped")]
    WorkerGone(String),
    #[error("Stored session {session_id} is invalid: {reason}")]
    CorruptSession { session_id: String, reason: String },
    #[error("Session store error: {0}")]
    Store(String),
}

/// Read-only view of a session for callers outside the worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub turn_count: u64,
    pub active_task: Option<TaskId>,
    pub last_input: Option<String>,
    pub context: ContextMap,
    /// Suspended tasks, most recent first
    pub suspended_tasks: Vec<TaskId>,
    pub stack_capacity: usize,
    pub interruption_count: u32,
    pub started_at: DateTime<Utc>,
}

impl SessionSnapshot {
    fn capture(record: &SessionRecord) -> Self {
        let state = &record.state;
        Self {
            session_id: state.session_id().to_string(),
            turn_count: state.turn_count(),
            active_task: state.active_task().cloned(),
            last_input: state.last_input().map(String::from),
            context: state.context().clone(),
            suspended_tasks: record.stack.task_ids(),
            stack_capacity: record.stack.capacity(),
            interruption_count: state.interruption_count(),
            started_at: state.started_at(),
        }
    }
}

/// Requests handled by a session worker
enum SessionRequest {
    Turn {
        input: String,
        reply: oneshot::Sender<TurnOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Reset {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Stop after everything queued before it
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session worker
#[derive(Clone)]
struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

/// Entry in the session map
enum SessionSlot {
    Running(SessionHandle),
    /// The worker is draining and the stored record is being deleted.
    /// Lookups fail until the slot is removed.
    Closing,
}

/// Owns the per-session workers
pub struct SessionManager<S: SessionStore + 'static> {
    controller: Arc<FlowController>,
    store: Arc<S>,
    /// Restores hold the write lock across the store read, so a close cannot
    /// interleave with a half-finished restore.
    sessions: RwLock<HashMap<String, SessionSlot>>,
}

impl<S: SessionStore + 'static> SessionManager<S> {
    pub fn new(controller: FlowController, store: S) -> Self {
        Self {
            controller: Arc::new(controller),
            store: Arc::new(store),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn controller(&self) -> &FlowController {
        &self.controller
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start (or reattach to) a session.
    ///
    /// Without an id a fresh one is generated. A known id is restored from the
    /// store; an unknown id creates a new session under that id.
    pub async fn create_session(&self, session_id: Option<String>) -> Result<String, RuntimeError> {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut sessions = self.sessions.write().await;
        match sessions.get(&session_id) {
            Some(SessionSlot::Running(_)) => return Ok(session_id),
            Some(SessionSlot::Closing) => return Err(RuntimeError::SessionClosing(session_id)),
            None => {}
        }

        let record = match self.store.load(&session_id).await.map_err(RuntimeError::Store)? {
            Some(record) => {
                tracing::info!(session_id = %session_id, turns = record.state.turn_count(), "Restored session");
                self.adopt(record)?
            }
            None => {
                let record = SessionRecord::new(SessionState::new(&session_id), self.controller.new_stack());
                self.store.save(&record).await.map_err(RuntimeError::Store)?;
                tracing::info!(session_id = %session_id, "Created session");
                record
            }
        };

        let handle = self.spawn_worker(record);
        sessions.insert(session_id.clone(), SessionSlot::Running(handle));
        Ok(session_id)
    }

    /// Process one user turn, waiting for any earlier turn of the session to finish
    pub async fn submit_turn(&self, session_id: &str, input: &str) -> Result<TurnOutcome, RuntimeError> {
        self.request(session_id, |reply| SessionRequest::Turn {
            input: input.to_string(),
            reply,
        })
        .await
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, RuntimeError> {
        self.request(session_id, |reply| SessionRequest::Snapshot { reply })
            .await
    }

    /// Clear context, active task and suspended tasks
    pub async fn reset(&self, session_id: &str) -> Result<SessionSnapshot, RuntimeError> {
        self.request(session_id, |reply| SessionRequest::Reset { reply })
            .await
    }

    /// Conversation log of a live or stored session, oldest line first
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, RuntimeError> {
        let slot = self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|slot| matches!(slot, SessionSlot::Running(_)));
        let known = match slot {
            Some(running) => running,
            None => self
                .store
                .load(session_id)
                .await
                .map_err(RuntimeError::Store)?
                .is_some(),
        };
        if !known {
            return Err(RuntimeError::SessionNotFound(session_id.to_string()));
        }
        self.store.transcript(session_id).await.map_err(RuntimeError::Store)
    }

    /// Stop the worker and delete the stored session with its transcript.
    ///
    /// Turns queued before the close still run. Until the worker has exited
    /// and the record is deleted, the session is marked closing and every
    /// lookup fails with `SessionNotFound`. Returns whether the session existed.
    pub async fn close(&self, session_id: &str) -> Result<bool, RuntimeError> {
        let previous = {
            let mut sessions = self.sessions.write().await;
            if matches!(sessions.get(session_id), Some(SessionSlot::Closing)) {
                return Ok(false);
            }
            sessions.insert(session_id.to_string(), SessionSlot::Closing)
        };

        let was_running = matches!(previous, Some(SessionSlot::Running(_)));
        if let Some(SessionSlot::Running(handle)) = previous {
            let (reply, rx) = oneshot::channel();
            if handle.tx.send(SessionRequest::Close { reply }).await.is_ok() {
                let _ = rx.await;
            }
        }

        let deleted = self.store.delete(session_id).await;
        self.sessions.write().await.remove(session_id);
        let was_stored = deleted.map_err(RuntimeError::Store)?;

        if was_running || was_stored {
            tracing::info!(session_id = %session_id, "Closed session");
        }
        Ok(was_running || was_stored)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|slot| matches!(slot, SessionSlot::Running(_)))
            .count()
    }

    /// Send a request to the session's worker and wait for its reply
    async fn request<T>(
        &self,
        session_id: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionRequest,
    ) -> Result<T, RuntimeError> {
        let handle = self.get_or_restore(session_id).await?;
        let (reply, rx) = oneshot::channel();
        if handle.tx.send(build(reply)).await.is_err() {
            return Err(self.worker_lost(session_id, &handle).await);
        }
        match rx.await {
            Ok(value) => Ok(value),
            Err(_) => Err(self.worker_lost(session_id, &handle).await),
        }
    }

    /// Classify a worker that went away mid-request.
    ///
    /// A worker stopped by `close` means the session is gone; any other exit
    /// is unexpected and the stale handle is dropped.
    async fn worker_lost(&self, session_id: &str, handle: &SessionHandle) -> RuntimeError {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session_id) {
            Some(SessionSlot::Running(current)) if current.tx.same_channel(&handle.tx) => {
                sessions.remove(session_id);
                tracing::error!(session_id = %session_id, "Session worker exited unexpectedly");
                RuntimeError::WorkerGone(session_id.to_string())
            }
            _ => RuntimeError::SessionNotFound(session_id.to_string()),
        }
    }

    async fn get_or_restore(&self, session_id: &str) -> Result<SessionHandle, RuntimeError> {
        let not_found = || RuntimeError::SessionNotFound(session_id.to_string());
        match self.sessions.read().await.get(session_id) {
            Some(SessionSlot::Running(handle)) => return Ok(handle.clone()),
            Some(SessionSlot::Closing) => return Err(not_found()),
            None => {}
        }

        let mut sessions = self.sessions.write().await;
        // Re-check: another request may have restored or closed it meanwhile
        match sessions.get(session_id) {
            Some(SessionSlot::Running(handle)) => return Ok(handle.clone()),
            Some(SessionSlot::Closing) => return Err(not_found()),
            None => {}
        }

        let record = self
            .store
            .load(session_id)
            .await
            .map_err(RuntimeError::Store)?
            .ok_or_else(not_found)?;
        let record = self.adopt(record)?;
        tracing::info!(session_id = %session_id, "Restored session on demand");

        let handle = self.spawn_worker(record);
        sessions.insert(session_id.to_string(), SessionSlot::Running(handle.clone()));
        Ok(handle)
    }

    /// Rebuild a stored stack under the configured capacity
    fn adopt(&self, record: SessionRecord) -> Result<SessionRecord, RuntimeError> {
        let SessionRecord { state, stack } = record;
        let (stack, dropped) = stack
            .rebuild(self.controller.config().stack_capacity)
            .map_err(|e| RuntimeError::CorruptSession {
                session_id: state.session_id().to_string(),
                reason: e.to_string(),
            })?;
        for frame in &dropped {
            tracing::warn!(
                session_id = %state.session_id(),
                task = %frame.task_id,
                capacity = stack.capacity(),
                "Dropped suspended task beyond configured stack capacity"
            );
        }
        Ok(SessionRecord::new(state, stack))
    }

    fn spawn_worker(&self, record: SessionRecord) -> SessionHandle {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);
        let controller = Arc::clone(&self.controller);
        let store = Arc::clone(&self.store);
        tokio::spawn(run_session_worker(controller, store, record, rx));
        SessionHandle { tx }
    }
}

async fn run_session_worker<S: SessionStore>(
    controller: Arc<FlowController>,
    store: Arc<S>,
    mut record: SessionRecord,
    mut rx: mpsc::Receiver<SessionRequest>,
) {
    let session_id = record.session_id().to_string();
    tracing::debug!(session_id = %session_id, "Session worker started");

    while let Some(request) = rx.recv().await {
        match request {
            SessionRequest::Turn { input, reply } => {
                let outcome = controller
                    .process_turn(&mut record.state, &mut record.stack, &input)
                    .await;
                persist(store.as_ref(), &record).await;
                log_turn(store.as_ref(), &session_id, &input, &outcome).await;
                let _ = reply.send(outcome);
            }
            SessionRequest::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot::capture(&record));
            }
            SessionRequest::Reset { reply } => {
                record.state.reset();
                record.stack.clear();
                persist(store.as_ref(), &record).await;
                tracing::info!(session_id = %session_id, "Session reset");
                let _ = reply.send(SessionSnapshot::capture(&record));
            }
            SessionRequest::Close { reply } => {
                let _ = reply.send(());
                break;
            }
        }
    }

    tracing::debug!(session_id = %session_id, "Session worker stopped");
}

/// The worker's copy stays authoritative when a save fails; the next save retries.
async fn persist<S: SessionStore + ?Sized>(store: &S, record: &SessionRecord) {
    if let Err(e) = store.save(record).await {
        tracing::error!(session_id = %record.session_id(), error = %e, "Failed to persist session");
    }
}

/// Transcript lines for one turn: the user's text, the reply, then any anomalies
fn transcript_lines(session_id: &str, input: &str, outcome: &TurnOutcome) -> Vec<TranscriptEntry> {
    let mut lines = vec![
        TranscriptEntry::new(session_id, outcome.turn, TranscriptRole::User, input),
        TranscriptEntry::new(session_id, outcome.turn, TranscriptRole::Agent, &outcome.response)
            .with_task(outcome.dispatched_task.as_str()),
    ];
    lines.extend(
        outcome
            .anomalies
            .iter()
            .map(|anomaly| TranscriptEntry::new(session_id, outcome.turn, TranscriptRole::System, &anomaly.to_string())),
    );
    lines
}

async fn log_turn<S: SessionStore + ?Sized>(store: &S, session_id: &str, input: &str, outcome: &TurnOutcome) {
    let lines = transcript_lines(session_id, input, outcome);
    if let Err(e) = store.append_transcript(&lines).await {
        tracing::error!(session_id = %session_id, turn = outcome.turn, error = %e, "Failed to log turn");
    }
}
