//! Decision oracle capability

use crate::state_machine::{RoutingDecision, TaskId};
use crate::tasks::TaskCapability;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),
    #[error("Decision oracle failed: {0}")]
    Oracle(String),
}

/// Read-only bundle the oracle classifies a turn from
#[derive(Debug, Clone, Serialize)]
pub struct TurnSnapshot {
    pub input: String,
    pub active_task: Option<TaskId>,
    /// Task a `Resume` would bring back
    pub resumable_task: Option<TaskId>,
    pub stack_depth: usize,
    pub stack_summary: String,
    pub turn_count: u64,
    pub capabilities: Vec<TaskCapability>,
}

impl TurnSnapshot {
    pub fn knows_task(&self, task_id: &str) -> bool {
        self.capabilities.iter().any(|c| c.id.as_str() == task_id)
    }
}

/// Classifies a turn into a routing decision.
///
/// Implementations are untrusted: they may name unknown tasks or ask for
/// impossible transitions. The router corrects both.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn classify(&self, snapshot: &TurnSnapshot) -> Result<RoutingDecision, RoutingError>;
}

#[async_trait]
impl<T: DecisionOracle + ?Sized> DecisionOracle for Arc<T> {
    async fn classify(&self, snapshot: &TurnSnapshot) -> Result<RoutingDecision, RoutingError> {
        (**self).classify(snapshot).await
    }
}
