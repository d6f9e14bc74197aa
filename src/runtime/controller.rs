//! Per-turn orchestration
//!
//! One call to [`FlowController::process_turn`] is one turn: route, plan,
//! apply stack effects, dispatch exactly one task handler, settle the active
//! task. Every failure on the way is recovered here; the caller always gets a
//! completed turn back.

use crate::config::FlowConfig;
use crate::routing::{DecisionOracle, Router, RoutingError};
use crate::state_machine::{
    next_active_task, plan_turn, Effect, FlowStack, Intent, SessionState, SessionView,
    StackError, TaskId, TransitionError, TurnPhase, TurnPlan,
};
use crate::tasks::{TaskError, TaskHandler, TaskOutput, TaskRegistry};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Anomalies recovered during a turn
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Flow stack: {0}")]
    Stack(#[from] StackError),
    #[error("Routing: {0}")]
    Routing(#[from] RoutingError),
    #[error("Planning: {0}")]
    Transition(#[from] TransitionError),
    #[error("Task '{task}' failed: {message}")]
    HandlerFailure { task: TaskId, message: String },
}

/// What the caller learns about a finished turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// Zero-based index of this turn
    pub turn: u64,
    pub response: String,
    pub continues: bool,
    pub active_task: Option<TaskId>,
    /// Intent actually carried out, after validation and fallbacks
    pub intent: Intent,
    pub dispatched_task: TaskId,
    #[serde(serialize_with = "serialize_anomalies")]
    pub anomalies: Vec<FlowError>,
}

fn serialize_anomalies<S: serde::Serializer>(anomalies: &[FlowError], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(anomalies.iter().map(ToString::to_string))
}

/// The single dispatch a turn performs, after stack effects were applied
struct Dispatch {
    intent: Intent,
    task_id: TaskId,
    input: String,
    /// Set when this turn pushed a frame that must be undone on failure
    pushed: bool,
}

pub struct FlowController {
    router: Router,
    config: FlowConfig,
}

impl FlowController {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        registry: TaskRegistry,
        config: FlowConfig,
    ) -> Result<Self, RoutingError> {
        let router = Router::new(oracle, registry, config.fallback_task.clone())?;
        Ok(Self { router, config })
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.router.registry()
    }

    /// An empty stack with the configured capacity
    pub fn new_stack(&self) -> FlowStack {
        FlowStack::new(self.config.stack_capacity)
    }

    #[allow(clippy::too_many_lines)]
    pub async fn process_turn(
        &self,
        session: &mut SessionState,
        stack: &mut FlowStack,
        input: &str,
    ) -> TurnOutcome {
        let turn = session.turn_count();
        let session_id = session.session_id().to_string();
        let mut anomalies = Vec::new();

        log_phase(&session_id, &TurnPhase::Routing);
        let routed = self.router.route(session, stack, input).await;
        anomalies.extend(routed.anomaly.map(FlowError::from));

        let plan = match plan_turn(session, &routed.decision, self.config.interrupt_policy, input) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Decision could not be planned, using fallback task");
                anomalies.push(e.into());
                self.fallback_plan(input)
            }
        };

        let mut dispatch = match apply_effects(plan, session, stack) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    stack = %stack.summary(),
                    "Flow stack operation failed, using fallback task"
                );
                anomalies.push(e.into());
                self.fallback_dispatch(input)
            }
        };

        let handler = match self.router.registry().get(dispatch.task_id.as_str()) {
            Some(handler) => Some(handler),
            None => {
                tracing::warn!(session_id = %session_id, task = %dispatch.task_id, "No handler registered, using fallback task");
                anomalies.push(RoutingError::UnknownTask(dispatch.task_id.clone()).into());
                rollback_push(&dispatch, stack);
                dispatch = self.fallback_dispatch(input);
                self.router.registry().get(dispatch.task_id.as_str())
            }
        };

        log_phase(
            &session_id,
            &TurnPhase::Dispatch {
                task_id: dispatch.task_id.clone(),
            },
        );
        let result = match handler {
            Some(handler) => self.invoke(handler.as_ref(), session, &dispatch).await,
            None => Err(TaskError::new(format!("No handler registered for '{}'", dispatch.task_id))),
        };

        let (response, continues) = match result {
            Ok(output) => (output.response, output.continues),
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    task = %dispatch.task_id,
                    error = %e,
                    "Task handler failed"
                );
                rollback_push(&dispatch, stack);
                anomalies.push(FlowError::HandlerFailure {
                    task: dispatch.task_id.clone(),
                    message: e.message.clone(),
                });
                (format!("I'm sorry, I encountered an error: {e}"), false)
            }
        };

        let active_task = next_active_task(&dispatch.task_id, continues);
        session.finish_turn(active_task.clone(), dispatch.input);
        log_phase(&session_id, &TurnPhase::Complete);

        tracing::info!(
            session_id = %session_id,
            turn,
            intent = ?dispatch.intent,
            task = %dispatch.task_id,
            continues,
            stack_depth = stack.depth(),
            anomalies = anomalies.len(),
            "Turn complete"
        );

        TurnOutcome {
            turn,
            response,
            continues,
            active_task,
            intent: dispatch.intent,
            dispatched_task: dispatch.task_id,
            anomalies,
        }
    }

    /// Run the handler against a staged copy of the context, committing it
    /// only when the handler succeeds.
    async fn invoke(
        &self,
        handler: &dyn TaskHandler,
        session: &mut SessionState,
        dispatch: &Dispatch,
    ) -> Result<TaskOutput, TaskError> {
        let mut staged = session.context().clone();
        let result = {
            let mut view = SessionView::new(session.session_id(), session.turn_count(), &mut staged);
            let call = handler.invoke(&dispatch.input, &mut view);
            match self.config.handler_timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or_else(|_| Err(TaskError::timed_out(&dispatch.task_id))),
                None => call.await,
            }
        };

        if result.is_ok() {
            session.commit_context(staged);
        }
        result
    }

    fn fallback_plan(&self, input: &str) -> TurnPlan {
        TurnPlan::fallback(self.config.fallback_task.clone(), input)
    }

    fn fallback_dispatch(&self, input: &str) -> Dispatch {
        Dispatch {
            intent: Intent::New,
            task_id: self.config.fallback_task.clone(),
            input: input.to_string(),
            pushed: false,
        }
    }
}

/// Execute the stack effects of a plan in order and return its dispatch.
///
/// A failing push or pop leaves the stack untouched, so no undo is needed
/// when this returns an error.
fn apply_effects(
    plan: TurnPlan,
    session: &mut SessionState,
    stack: &mut FlowStack,
) -> Result<Dispatch, StackError> {
    let mut pushed = false;
    let mut target = None;

    for effect in plan.effects {
        match effect {
            Effect::SuspendActive { frame } => {
                tracing::debug!(task = %frame.task_id, depth = stack.depth(), "Suspending active task");
                stack.push(frame)?;
                pushed = true;
                session.record_interruption();
            }
            Effect::DiscardActive { task_id } => {
                tracing::debug!(task = %task_id, "Discarding active task");
                session.record_interruption();
            }
            Effect::ResumeTop => {
                let frame = stack.pop()?;
                tracing::debug!(
                    task = %frame.task_id,
                    suspended_at_turn = frame.suspended_at_turn,
                    "Resuming suspended task"
                );
                session.restore_context(frame.saved_context);
                target = Some((frame.task_id, frame.saved_input));
            }
            Effect::Dispatch { task_id, input } => target = Some((task_id, input)),
        }
    }

    // plan_turn always ends a plan with a dispatch or a resume
    let (task_id, input) = target.ok_or(StackError::EmptyStack)?;
    Ok(Dispatch {
        intent: plan.intent,
        task_id,
        input,
        pushed,
    })
}

fn rollback_push(dispatch: &Dispatch, stack: &mut FlowStack) {
    if dispatch.pushed {
        if let Ok(frame) = stack.pop() {
            tracing::debug!(task = %frame.task_id, "Rolled back suspension");
        }
    }
}

fn log_phase(session_id: &str, phase: &TurnPhase) {
    tracing::trace!(session_id = %session_id, phase = ?phase, "Turn phase");
}
