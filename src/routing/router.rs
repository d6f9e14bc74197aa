//! Oracle invocation and decision validation

use super::{DecisionOracle, RoutingError, TurnSnapshot};
use crate::state_machine::{FlowStack, Intent, RoutingDecision, SessionState, TaskId};
use crate::tasks::TaskRegistry;
use std::sync::Arc;

/// A decision that is safe to plan, plus whatever had to be corrected
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedTurn {
    pub decision: RoutingDecision,
    pub anomaly: Option<RoutingError>,
}

impl RoutedTurn {
    fn accepted(decision: RoutingDecision) -> Self {
        Self {
            decision,
            anomaly: None,
        }
    }
}

pub struct Router {
    oracle: Arc<dyn DecisionOracle>,
    registry: TaskRegistry,
    fallback: TaskId,
}

impl Router {
    /// Fails when the fallback task is not registered, since every
    /// correction the router makes ends up there.
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        registry: TaskRegistry,
        fallback: TaskId,
    ) -> Result<Self, RoutingError> {
        if !registry.contains(fallback.as_str()) {
            return Err(RoutingError::UnknownTask(fallback));
        }
        Ok(Self {
            oracle,
            registry,
            fallback,
        })
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn fallback(&self) -> &TaskId {
        &self.fallback
    }

    pub fn snapshot(&self, session: &SessionState, stack: &FlowStack, input: &str) -> TurnSnapshot {
        TurnSnapshot {
            input: input.to_string(),
            active_task: session.active_task().cloned(),
            resumable_task: stack.peek_task_id().cloned(),
            stack_depth: stack.depth(),
            stack_summary: stack.summary(),
            turn_count: session.turn_count(),
            capabilities: self.registry.capabilities(),
        }
    }

    /// Ask the oracle about this turn and validate its answer
    pub async fn route(&self, session: &SessionState, stack: &FlowStack, input: &str) -> RoutedTurn {
        let snapshot = self.snapshot(session, stack, input);
        tracing::debug!(
            session_id = %session.session_id(),
            active_task = ?snapshot.active_task,
            resumable_task = ?snapshot.resumable_task,
            stack = %snapshot.stack_summary,
            "Classifying turn"
        );

        match self.oracle.classify(&snapshot).await {
            Ok(decision) => {
                tracing::debug!(
                    session_id = %session.session_id(),
                    intent = ?decision.intent,
                    target = ?decision.target_task,
                    confidence = decision.confidence,
                    reason = %decision.reason,
                    "Oracle decision"
                );
                self.validate(
                    decision,
                    snapshot.active_task.as_ref(),
                    snapshot.resumable_task.is_some(),
                )
            }
            Err(e) => {
                tracing::warn!(session_id = %session.session_id(), error = %e, "Oracle failed, using fallback task");
                RoutedTurn {
                    decision: self.fallback_decision("oracle failure"),
                    anomaly: Some(e),
                }
            }
        }
    }

    /// Correct a raw oracle decision against the registry and session.
    ///
    /// Checks in order: the target must be registered; `Resume` needs a
    /// suspended task; `Continue` needs an active task; `New` and `Interrupt`
    /// need a target. An `Interrupt` aimed at the task that is already active
    /// is treated as `Continue`.
    pub fn validate(
        &self,
        decision: RoutingDecision,
        active_task: Option<&TaskId>,
        has_suspended: bool,
    ) -> RoutedTurn {
        if let Some(target) = &decision.target_task {
            if !self.registry.contains(target.as_str()) {
                tracing::warn!(task = %target, "Oracle named an unregistered task");
                return RoutedTurn {
                    anomaly: Some(RoutingError::UnknownTask(target.clone())),
                    decision: self.fallback_decision("unknown task"),
                };
            }
        }

        match decision.intent {
            Intent::Resume if !has_suspended => {
                tracing::info!("Resume requested with nothing suspended, starting fallback task");
                RoutedTurn::accepted(self.fallback_decision("nothing to resume"))
            }
            Intent::Continue if active_task.is_none() => {
                let target = decision
                    .target_task
                    .clone()
                    .unwrap_or_else(|| self.fallback.clone());
                tracing::info!(task = %target, "Continue requested with no active task, starting new task");
                RoutedTurn::accepted(RoutingDecision {
                    intent: Intent::New,
                    target_task: Some(target),
                    save_current: false,
                    ..decision
                })
            }
            Intent::New | Intent::Interrupt if decision.target_task.is_none() => {
                RoutedTurn::accepted(self.fallback_decision("missing target"))
            }
            Intent::Interrupt if decision.target_task.as_ref() == active_task => {
                RoutedTurn::accepted(RoutingDecision {
                    intent: Intent::Continue,
                    save_current: false,
                    ..decision
                })
            }
            _ => RoutedTurn::accepted(decision),
        }
    }

    fn fallback_decision(&self, reason: &str) -> RoutingDecision {
        RoutingDecision::new_task(self.fallback.clone())
            .with_confidence(0.0)
            .with_reason(reason)
    }
}
