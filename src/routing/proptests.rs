//! Property-based tests for router validation

use super::*;
use crate::config::InterruptPolicy;
use crate::runtime::testing::{ScriptedOracle, ScriptedTask};
use crate::state_machine::{plan_turn, Intent, RoutingDecision, SessionState, TaskId};
use crate::tasks::TaskRegistry;
use proptest::prelude::*;
use std::sync::Arc;

const REGISTERED: &[&str] = &["general_query", "planner", "health_monitor", "wellbeing"];

fn router() -> Router {
    let registry = REGISTERED.iter().fold(TaskRegistry::new(), |registry, id| {
        registry.with_task(Arc::new(ScriptedTask::new(*id)))
    });
    Router::new(Arc::new(ScriptedOracle::new()), registry, "general_query".into()).unwrap()
}

/// Mix of registered and unknown task names
fn arb_task_name() -> impl Strategy<Value = TaskId> {
    prop_oneof![
        proptest::sample::select(REGISTERED).prop_map(TaskId::from),
        "[a-z]{3,10}".prop_map(TaskId::from),
    ]
}

fn arb_intent() -> impl Strategy<Value = Intent> {
    prop_oneof![
        Just(Intent::New),
        Just(Intent::Continue),
        Just(Intent::Interrupt),
        Just(Intent::Resume),
    ]
}

fn arb_raw_decision() -> impl Strategy<Value = RoutingDecision> {
    (arb_intent(), proptest::option::of(arb_task_name()), any::<bool>(), any::<f32>()).prop_map(
        |(intent, target_task, save_current, confidence)| RoutingDecision {
            intent,
            target_task,
            save_current,
            confidence,
            reason: String::new(),
        },
    )
}

fn arb_active() -> impl Strategy<Value = Option<TaskId>> {
    proptest::option::of(proptest::sample::select(REGISTERED).prop_map(TaskId::from))
}

proptest! {
    #[test]
    fn prop_validated_decisions_are_consistent(
        decision in arb_raw_decision(),
        active in arb_active(),
        has_suspended in any::<bool>(),
    ) {
        let router = router();
        let routed = router.validate(decision, active.as_ref(), has_suspended);
        let validated = &routed.decision;

        if let Some(target) = &validated.target_task {
            prop_assert!(router.registry().contains(target.as_str()));
        }
        match validated.intent {
            Intent::Resume => prop_assert!(has_suspended),
            Intent::Continue => prop_assert!(active.is_some()),
            Intent::New | Intent::Interrupt => prop_assert!(validated.target_task.is_some()),
        }
        if let Some(RoutingError::UnknownTask(_)) = routed.anomaly {
            prop_assert_eq!(validated.intent, Intent::New);
            prop_assert_eq!(validated.target_task.as_ref(), Some(router.fallback()));
        }
    }

    #[test]
    fn prop_validated_decisions_always_plan(
        decision in arb_raw_decision(),
        active in arb_active(),
        has_suspended in any::<bool>(),
    ) {
        let router = router();
        let mut session = SessionState::new("prop-session");
        session.finish_turn(active.clone(), "earlier input".to_string());

        let routed = router.validate(decision, active.as_ref(), has_suspended);
        let plan = plan_turn(&session, &routed.decision, InterruptPolicy::FollowOracle, "now");

        prop_assert!(plan.is_ok());
    }
}
