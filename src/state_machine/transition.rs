//! Pure turn planning
//!
//! Given the session and a validated routing decision, decide which stack
//! operations to perform and which single task to dispatch. No I/O happens
//! here; the flow controller executes the resulting effects.

use super::{Effect, FlowFrame, Intent, RoutingDecision, SessionState, TaskId};
use crate::config::InterruptPolicy;
use thiserror::Error;

/// Result of planning a turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnPlan {
    pub intent: Intent,
    pub effects: Vec<Effect>,
}

impl TurnPlan {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Plan used whenever a decision cannot be carried out
    pub fn fallback(fallback_task: TaskId, input: &str) -> Self {
        Self::new(Intent::New).with_effect(Effect::dispatch(fallback_task, input))
    }

    /// Whether this plan suspends the active task
    pub fn suspends(&self) -> bool {
        self.effects
            .iter()
            .any(|effect| matches!(effect, Effect::SuspendActive { .. }))
    }
}

/// Decisions that cannot be planned against the current session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{intent:?} requires a target task")]
    MissingTarget { intent: Intent },
    #[error("Continue requested but no task is active")]
    NoActiveTask,
}

/// Plan one turn.
///
/// `Interrupt` suspends the active task only when the interrupt policy says so
/// and there is an active task to suspend. The suspended frame captures the
/// input last dispatched to that task (or the current input if none was
/// recorded) and a deep copy of the context.
pub fn plan_turn(
    session: &SessionState,
    decision: &RoutingDecision,
    policy: InterruptPolicy,
    input: &str,
) -> Result<TurnPlan, TransitionError> {
    match decision.intent {
        Intent::New => {
            let target = require_target(decision)?;
            Ok(TurnPlan::new(Intent::New).with_effect(Effect::dispatch(target, input)))
        }

        Intent::Continue => {
            let active = session
                .active_task()
                .cloned()
                .ok_or(TransitionError::NoActiveTask)?;
            Ok(TurnPlan::new(Intent::Continue).with_effect(Effect::dispatch(active, input)))
        }

        Intent::Interrupt => {
            let target = require_target(decision)?;
            let mut plan = TurnPlan::new(Intent::Interrupt);

            if let Some(active) = session.active_task() {
                if policy.should_save(decision.save_current) {
                    let saved_input = session.last_input().unwrap_or(input);
                    plan = plan.with_effect(Effect::SuspendActive {
                        frame: FlowFrame::new(
                            active.clone(),
                            saved_input,
                            session.context().clone(),
                            session.turn_count(),
                        ),
                    });
                } else {
                    plan = plan.with_effect(Effect::DiscardActive {
                        task_id: active.clone(),
                    });
                }
            }

            Ok(plan.with_effect(Effect::dispatch(target, input)))
        }

        Intent::Resume => Ok(TurnPlan::new(Intent::Resume).with_effect(Effect::ResumeTop)),
    }
}

/// Active task after a dispatch finished
pub fn next_active_task(dispatched: &TaskId, continues: bool) -> Option<TaskId> {
    continues.then(|| dispatched.clone())
}

fn require_target(decision: &RoutingDecision) -> Result<TaskId, TransitionError> {
    decision
        .target_task
        .clone()
        .ok_or(TransitionError::MissingTarget {
            intent: decision.intent,
        })
}
