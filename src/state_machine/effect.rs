//! Effects produced by turn planning

use super::stack::FlowFrame;
use super::state::TaskId;

/// Steps the controller executes, in order, to carry out a routing decision.
///
/// A plan always ends in exactly one of `Dispatch` or `ResumeTop`.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Push the active task onto the flow stack
    SuspendActive { frame: FlowFrame },

    /// Drop the active task without saving it
    DiscardActive { task_id: TaskId },

    /// Pop the top frame, restore its context and re-invoke its task with the saved input
    ResumeTop,

    /// Invoke a task handler with the given input
    Dispatch { task_id: TaskId, input: String },
}

impl Effect {
    pub fn dispatch(task_id: TaskId, input: impl Into<String>) -> Self {
        Effect::Dispatch {
            task_id,
            input: input.into(),
        }
    }

    /// Whether this effect runs a task handler
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Effect::Dispatch { .. } | Effect::ResumeTop)
    }
}
