//! Session state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Free-form context shared between the controller and task handlers
pub type ContextMap = BTreeMap<String, Value>;

/// Stable identifier of a task handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Phase of a single turn. Every turn starts in `Routing` and ends in `Complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    Routing,
    Dispatch { task_id: TaskId },
    Complete,
}

/// Requested change to the active task alongside a context merge
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveTaskChange {
    #[default]
    Keep,
    Set(TaskId),
    Clear,
}

/// The mutable record of one user's conversation.
///
/// Owned by the flow controller's session worker. The turn counter only moves
/// at turn boundaries and context keys are only removed through [`unset`].
///
/// [`unset`]: SessionState::unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    session_id: String,
    turn_count: u64,
    #[serde(default)]
    context: ContextMap,
    #[serde(default)]
    active_task: Option<TaskId>,
    /// Input most recently dispatched to the active task
    #[serde(default)]
    last_input: Option<String>,
    #[serde(default)]
    interruption_count: u32,
    started_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turn_count: 0,
            context: ContextMap::new(),
            active_task: None,
            last_input: None,
            interruption_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    pub fn active_task(&self) -> Option<&TaskId> {
        self.active_task.as_ref()
    }

    pub fn last_input(&self) -> Option<&str> {
        self.last_input.as_deref()
    }

    pub fn interruption_count(&self) -> u32 {
        self.interruption_count
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Merge `entries` into the context and optionally change the active task.
    ///
    /// New keys are added and existing keys overwritten; nothing is removed.
    pub fn update(&mut self, entries: ContextMap, active_task: ActiveTaskChange) {
        self.context.extend(entries);
        match active_task {
            ActiveTaskChange::Keep => {}
            ActiveTaskChange::Set(task_id) => self.active_task = Some(task_id),
            ActiveTaskChange::Clear => self.active_task = None,
        }
    }

    /// Remove a single context key
    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.context.remove(key)
    }

    /// Drop all conversational progress, keeping identity and the turn counter
    pub fn reset(&mut self) {
        self.context.clear();
        self.active_task = None;
        self.last_input = None;
        self.interruption_count = 0;
    }

    pub(crate) fn restore_context(&mut self, snapshot: ContextMap) {
        self.update(snapshot, ActiveTaskChange::Keep);
    }

    /// Replace the context with a staged copy after a handler succeeded
    pub(crate) fn commit_context(&mut self, staged: ContextMap) {
        self.context = staged;
    }

    pub(crate) fn finish_turn(&mut self, active_task: Option<TaskId>, dispatched_input: String) {
        self.last_input = active_task.as_ref().map(|_| dispatched_input);
        self.active_task = active_task;
        self.turn_count += 1;
    }

    pub(crate) fn record_interruption(&mut self) {
        self.interruption_count = self.interruption_count.saturating_add(1);
    }
}

/// What a task handler may see and touch of the session during one invocation.
///
/// Read and merge-write access to the context only. The active task and the
/// flow stack are not reachable from here.
pub struct SessionView<'a> {
    session_id: &'a str,
    turn: u64,
    context: &'a mut ContextMap,
}

impl<'a> SessionView<'a> {
    pub fn new(session_id: &'a str, turn: u64, context: &'a mut ContextMap) -> Self {
        Self {
            session_id,
            turn,
            context,
        }
    }

    pub fn session_id(&self) -> &str {
        self.session_id
    }

    /// Zero-based index of the turn being processed
    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn context(&self) -> &ContextMap {
        &*self.context
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn merge(&mut self, entries: ContextMap) {
        self.context.extend(entries);
    }

    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.context.remove(key)
    }
}
