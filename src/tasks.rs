//! Task handlers
//!
//! A task is a single-purpose conversational handler addressed by a stable
//! [`TaskId`]. The controller only decides *which* task runs; what a task does
//! with the input is its own business.

mod catalog;
mod prompt;
mod registry;

pub use catalog::{builtin_registry, BuiltinTask, BUILTIN_TASKS};
pub use prompt::PromptTask;
pub use registry::{TaskCapability, TaskRegistry};

use crate::state_machine::{SessionView, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub response: String,
    /// The handler expects the next turn to be addressed to it
    pub continues: bool,
}

impl TaskOutput {
    pub fn done(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            continues: false,
        }
    }

    pub fn continuing(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            continues: true,
        }
    }
}

/// Domain failure raised by a handler
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn timed_out(task_id: &TaskId) -> Self {
        Self::new(format!("Task '{task_id}' timed out"))
    }
}

/// Capability every task variant implements.
///
/// Handlers must not retain the session view beyond the call.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn id(&self) -> &TaskId;

    /// One-line description offered to the decision oracle
    fn description(&self) -> &str;

    async fn invoke(
        &self,
        input: &str,
        session: &mut SessionView<'_>,
    ) -> Result<TaskOutput, TaskError>;
}
