//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::{SessionRecord, SessionStore};
use crate::db::TranscriptEntry;
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::routing::{DecisionOracle, RoutingError, TurnSnapshot};
use crate::state_machine::{ContextMap, RoutingDecision, SessionView, TaskId};
use crate::tasks::{TaskError, TaskHandler, TaskOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text response
    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(LlmResponse::from_text(text)));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Network("No mock response queued".to_string())))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Scripted Oracle
// ============================================================================

/// Oracle that replays queued decisions in order
pub struct ScriptedOracle {
    decisions: Mutex<VecDeque<Result<RoutingDecision, RoutingError>>>,
    snapshots: Arc<Mutex<Vec<TurnSnapshot>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            decisions: Mutex::new(VecDeque::new()),
            snapshots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn then(self, decision: RoutingDecision) -> Self {
        self.decisions.lock().unwrap().push_back(Ok(decision));
        self
    }

    #[must_use]
    pub fn then_error(self, message: &str) -> Self {
        self.decisions
            .lock()
            .unwrap()
            .push_back(Err(RoutingError::Oracle(message.to_string())));
        self
    }

    /// Shared record of every snapshot classified, usable after the oracle is moved
    pub fn snapshots(&self) -> Arc<Mutex<Vec<TurnSnapshot>>> {
        Arc::clone(&self.snapshots)
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn classify(&self, snapshot: &TurnSnapshot) -> Result<RoutingDecision, RoutingError> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RoutingError::Oracle("No scripted decision".to_string())))
    }
}

// ============================================================================
// Scripted Tasks
// ============================================================================

/// Task handler with queued outputs that records every invocation.
///
/// Once the queue is empty it answers with a non-continuing echo.
pub struct ScriptedTask {
    id: TaskId,
    description: String,
    outputs: Mutex<VecDeque<TaskOutput>>,
    writes: Vec<(String, Value)>,
    delay: Option<Duration>,
    invocations: Mutex<Vec<(String, ContextMap)>>,
}

impl ScriptedTask {
    pub fn new(id: &str) -> Self {
        Self {
            id: TaskId::from(id),
            description: format!("Scripted {id}"),
            outputs: Mutex::new(VecDeque::new()),
            writes: Vec::new(),
            delay: None,
            invocations: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn then(self, output: TaskOutput) -> Self {
        self.outputs.lock().unwrap().push_back(output);
        self
    }

    /// Context entry written on every invocation
    #[must_use]
    pub fn writes(mut self, key: &str, value: Value) -> Self {
        self.writes.push((key.to_string(), value));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inputs(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(input, _)| input.clone())
            .collect()
    }

    /// Context as the handler saw it when each invocation started
    pub fn seen_contexts(&self) -> Vec<ContextMap> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, context)| context.clone())
            .collect()
    }
}

#[async_trait]
impl TaskHandler for ScriptedTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(
        &self,
        input: &str,
        session: &mut SessionView<'_>,
    ) -> Result<TaskOutput, TaskError> {
        self.invocations
            .lock()
            .unwrap()
            .push((input.to_string(), session.context().clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        for (key, value) in &self.writes {
            session.set(key.clone(), value.clone());
        }
        let next = self.outputs.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| TaskOutput::done(format!("{} handled: {input}", self.id))))
    }
}

/// Task handler that always fails, optionally after writing to the context
pub struct FailingTask {
    id: TaskId,
    message: String,
    writes: Vec<(String, Value)>,
}

impl FailingTask {
    pub fn new(id: &str, message: &str) -> Self {
        Self {
            id: TaskId::from(id),
            message: message.to_string(),
            writes: Vec::new(),
        }
    }

    #[must_use]
    pub fn writes(mut self, key: &str, value: Value) -> Self {
        self.writes.push((key.to_string(), value));
        self
    }
}

#[async_trait]
impl TaskHandler for FailingTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn invoke(
        &self,
        _input: &str,
        session: &mut SessionView<'_>,
    ) -> Result<TaskOutput, TaskError> {
        for (key, value) in &self.writes {
            session.set(key.clone(), value.clone());
        }
        Err(TaskError::new(self.message.clone()))
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory session store for testing
#[derive(Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
    transcript: Mutex<Vec<TranscriptEntry>>,
    saves: Mutex<u64>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session_id: &str) -> Option<SessionRecord> {
        self.records.lock().unwrap().get(session_id).cloned()
    }

    pub fn insert(&self, record: SessionRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.session_id().to_string(), record);
    }

    pub fn save_count(&self) -> u64 {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String> {
        Ok(self.record(session_id))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), String> {
        self.insert(record.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, String> {
        self.transcript
            .lock()
            .unwrap()
            .retain(|entry| entry.session_id != session_id);
        Ok(self.records.lock().unwrap().remove(session_id).is_some())
    }

    async fn append_transcript(&self, entries: &[TranscriptEntry]) -> Result<(), String> {
        self.transcript.lock().unwrap().extend_from_slice(entries);
        Ok(())
    }

    async fn transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, String> {
        Ok(self
            .transcript
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .cloned()
            .collect())
    }
}
