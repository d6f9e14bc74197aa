//! Bounded LIFO store of suspended tasks

use super::state::{ContextMap, TaskId};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use thiserror::Error;

/// Flow stack invariant violations. Always recovered by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("Flow stack is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },
    #[error("Task '{0}' is already suspended")]
    DuplicateTask(TaskId),
    #[error("Flow stack is empty")]
    EmptyStack,
}

/// A suspended task, captured at interruption time.
///
/// Frames are never modified after being pushed; resuming consumes the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFrame {
    pub task_id: TaskId,
    pub saved_input: String,
    /// Deep copy of the session context at suspension time
    pub saved_context: ContextMap,
    pub suspended_at_turn: u64,
}

impl FlowFrame {
    pub fn new(
        task_id: TaskId,
        saved_input: impl Into<String>,
        saved_context: ContextMap,
        suspended_at_turn: u64,
    ) -> Self {
        Self {
            task_id,
            saved_input: saved_input.into(),
            saved_context,
            suspended_at_turn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStack {
    frames: Vec<FlowFrame>,
    capacity: NonZeroUsize,
}

impl FlowStack {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// Suspend a frame on top of the stack.
    ///
    /// Fails without touching the stack if it is full or the task is already suspended.
    pub fn push(&mut self, frame: FlowFrame) -> Result<(), StackError> {
        if self.frames.len() >= self.capacity.get() {
            return Err(StackError::CapacityExceeded {
                capacity: self.capacity.get(),
            });
        }
        if self.contains(&frame.task_id) {
            return Err(StackError::DuplicateTask(frame.task_id));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Remove and return the most recently suspended frame
    pub fn pop(&mut self) -> Result<FlowFrame, StackError> {
        self.frames.pop().ok_or(StackError::EmptyStack)
    }

    /// Task that would be resumed next, if any
    pub fn peek_task_id(&self) -> Option<&TaskId> {
        self.frames.last().map(|frame| &frame.task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.frames.iter().any(|frame| &frame.task_id == task_id)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Suspended task ids, top of stack first
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.frames.iter().rev().map(|frame| frame.task_id.clone()).collect()
    }

    /// Short description for the oracle, e.g. `"planner, wellbeing"`
    pub fn summary(&self) -> String {
        if self.frames.is_empty() {
            return "empty".to_string();
        }
        self.task_ids()
            .iter()
            .map(TaskId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Re-apply the push invariants to a stack read from storage.
    ///
    /// The stack is rebuilt under `capacity`. Frames older than what fits are
    /// dropped and returned, oldest first. A repeated task id fails the rebuild.
    pub fn rebuild(self, capacity: NonZeroUsize) -> Result<(Self, Vec<FlowFrame>), StackError> {
        let mut frames = self.frames;
        let excess = frames.len().saturating_sub(capacity.get());
        let dropped: Vec<FlowFrame> = frames.drain(..excess).collect();

        let mut stack = Self::new(capacity);
        for frame in frames {
            stack.push(frame)?;
        }
        Ok((stack, dropped))
    }
}
