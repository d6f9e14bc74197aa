//! Property-based tests for the flow stack and turn planning
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::config::InterruptPolicy;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    "[a-z_]{3,12}".prop_map(TaskId::from)
}

fn arb_distinct_task_ids(max: usize) -> impl Strategy<Value = Vec<TaskId>> {
    proptest::collection::btree_set("[a-z_]{3,12}", 1..=max)
        .prop_map(|ids: BTreeSet<String>| ids.into_iter().map(TaskId::from).collect())
}

fn arb_context() -> impl Strategy<Value = ContextMap> {
    proptest::collection::btree_map("[a-z]{1,6}", any::<i64>().prop_map(serde_json::Value::from), 0..5)
}

fn arb_frame(task_id: TaskId) -> impl Strategy<Value = FlowFrame> {
    ("[a-zA-Z ]{0,30}", arb_context(), 0u64..100).prop_map(move |(input, context, turn)| {
        FlowFrame::new(task_id.clone(), input, context, turn)
    })
}

fn arb_policy() -> impl Strategy<Value = InterruptPolicy> {
    prop_oneof![
        Just(InterruptPolicy::FollowOracle),
        Just(InterruptPolicy::AlwaysSave),
        Just(InterruptPolicy::NeverSave),
    ]
}

fn arb_decision() -> impl Strategy<Value = RoutingDecision> {
    prop_oneof![
        arb_task_id().prop_map(RoutingDecision::new_task),
        Just(RoutingDecision::continue_active()),
        (arb_task_id(), any::<bool>()).prop_map(|(t, save)| RoutingDecision::interrupt(t, save)),
        Just(RoutingDecision::resume()),
    ]
}

fn arb_session() -> impl Strategy<Value = SessionState> {
    (proptest::option::of(arb_task_id()), "[a-z ]{0,20}", arb_context()).prop_map(
        |(active, input, context)| {
            let mut session = SessionState::new("prop-session");
            session.update(context, ActiveTaskChange::Keep);
            session.finish_turn(active, input);
            session
        },
    )
}

fn stack_of(capacity: usize) -> FlowStack {
    FlowStack::new(NonZeroUsize::new(capacity).unwrap())
}

proptest! {
    // Invariant 1: pops come back in exact reverse push order
    #[test]
    fn prop_stack_is_lifo(ids in arb_distinct_task_ids(8)) {
        let mut stack = stack_of(ids.len());
        for id in &ids {
            stack.push(FlowFrame::new(id.clone(), "", ContextMap::new(), 0)).unwrap();
        }

        let mut popped = Vec::new();
        while let Ok(frame) = stack.pop() {
            popped.push(frame.task_id);
        }

        let mut expected = ids.clone();
        expected.reverse();
        prop_assert_eq!(popped, expected);
    }

    // Invariant 2: a duplicate push fails and leaves the stack untouched
    #[test]
    fn prop_duplicate_rejected(ids in arb_distinct_task_ids(5), pick in any::<prop::sample::Index>()) {
        let mut stack = stack_of(ids.len() + 1);
        for id in &ids {
            stack.push(FlowFrame::new(id.clone(), "", ContextMap::new(), 0)).unwrap();
        }
        let before = stack.clone();
        let duplicate = pick.get(&ids).clone();

        let result = stack.push(FlowFrame::new(duplicate.clone(), "again", ContextMap::new(), 9));

        prop_assert_eq!(result, Err(StackError::DuplicateTask(duplicate)));
        prop_assert_eq!(stack, before);
    }

    // Invariant 3: a push at capacity fails and leaves the stack untouched
    #[test]
    fn prop_capacity_bound(ids in arb_distinct_task_ids(6), extra in arb_task_id()) {
        prop_assume!(!ids.contains(&extra));
        let mut stack = stack_of(ids.len());
        for id in &ids {
            stack.push(FlowFrame::new(id.clone(), "", ContextMap::new(), 0)).unwrap();
        }
        let before = stack.clone();

        let result = stack.push(FlowFrame::new(extra, "", ContextMap::new(), 0));

        prop_assert_eq!(result, Err(StackError::CapacityExceeded { capacity: ids.len() }));
        prop_assert_eq!(stack, before);
    }

    // Invariant 4: a popped frame is exactly the frame that was pushed
    #[test]
    fn prop_frames_are_immutable(frame in arb_task_id().prop_flat_map(arb_frame)) {
        let mut stack = stack_of(1);
        stack.push(frame.clone()).unwrap();
        prop_assert_eq!(stack.pop().unwrap(), frame);
    }

    // Invariant 5: every successful plan dispatches exactly one task
    #[test]
    fn prop_plan_dispatches_once(
        session in arb_session(),
        decision in arb_decision(),
        policy in arb_policy(),
        input in "[a-z ]{1,20}",
    ) {
        if let Ok(plan) = transition::plan_turn(&session, &decision, policy, &input) {
            let dispatches = plan.effects.iter().filter(|e| e.is_dispatch()).count();
            prop_assert_eq!(dispatches, 1, "plan {:?}", plan);
            prop_assert!(plan.effects.last().is_some_and(Effect::is_dispatch));
        }
    }

    // Invariant 6: only Interrupt can touch the active task, and only when one exists
    #[test]
    fn prop_suspend_requires_active_interrupt(
        session in arb_session(),
        decision in arb_decision(),
        policy in arb_policy(),
    ) {
        if let Ok(plan) = transition::plan_turn(&session, &decision, policy, "input") {
            if plan.suspends() {
                prop_assert_eq!(plan.intent, Intent::Interrupt);
                prop_assert!(session.active_task().is_some());
                prop_assert!(policy.should_save(decision.save_current));
            }
        }
    }
}
