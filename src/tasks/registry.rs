//! Static task registry

use super::TaskHandler;
use crate::state_machine::TaskId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the oracle is told about a registered task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCapability {
    pub id: TaskId,
    pub description: String,
}

/// Fixed mapping from task ids to handlers, populated once at startup
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: BTreeMap<TaskId, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own id. A later registration with the same id wins.
    #[must_use]
    pub fn with_task(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        let id = handler.id().clone();
        if self.handlers.insert(id.clone(), handler).is_some() {
            tracing::warn!(task = %id, "Task registered twice, keeping the later handler");
        }
        self
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_id).cloned()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.handlers.contains_key(task_id)
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.handlers.keys().cloned().collect()
    }

    pub fn capabilities(&self) -> Vec<TaskCapability> {
        self.handlers
            .values()
            .map(|handler| TaskCapability {
                id: handler.id().clone(),
                description: handler.description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
