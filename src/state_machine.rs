//! Conversation flow state machine
//!
//! Session state, the suspended-task stack, and the pure planning step that
//! turns a routing decision into an ordered list of effects.

mod decision;
mod effect;
mod stack;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use decision::{Intent, RoutingDecision};
pub use effect::Effect;
pub use stack::{FlowFrame, FlowStack, StackError};
pub use state::{ActiveTaskChange, ContextMap, SessionState, SessionView, TaskId, TurnPhase};
pub use transition::{next_active_task, plan_turn, TransitionError, TurnPlan};
