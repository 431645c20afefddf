//! The six literal end-to-end scenarios named for statechart interpreters:
//! traffic light, internal-vs-external transitions, parallel orthogonal
//! regions, guarded assign, delayed `after` transitions, and final-state
//! done-event propagation across parallel regions — plus broader invariant
//! coverage (ordering, determinism, parallel independence).

use gearbox::{
    guards::GuardExpr,
    machine::{MachineBuilder, StateNodeConfig, TransitionConfig},
    node::{Action, DelayRef},
    options::MachineOptions,
    state_value::StateValue,
};
use serde_json::json;
use std::collections::BTreeMap;

fn traffic_light() -> gearbox::Machine {
    let root = StateNodeConfig::compound("(machine)", "green")
        .child(StateNodeConfig::atomic("green").on("TIMER", TransitionConfig::new().target("yellow")))
        .child(StateNodeConfig::atomic("yellow").on("TIMER", TransitionConfig::new().target("red")))
        .child(StateNodeConfig::atomic("red").on("TIMER", TransitionConfig::new().target("green")));
    MachineBuilder::new("traffic_light", root).build(MachineOptions::new(), json!({})).unwrap()
}

#[test]
fn scenario_1_traffic_light_cycles_back_to_green() {
    let machine = traffic_light();
    let mut state = machine.initial_state(None).unwrap();
    assert_eq!(state.value, StateValue::Leaf("green".to_string()));

    for _ in 0..3 {
        state = machine.transition(&state, "TIMER", None).unwrap();
        assert!(state.changed, "every TIMER tick changes the active light");
    }
    assert_eq!(state.value, StateValue::Leaf("green".to_string()));
}

fn internal_vs_external_machine() -> gearbox::Machine {
    let root = StateNodeConfig::compound("(machine)", "red")
        .child(
            StateNodeConfig::compound("red", "walk")
                .child(StateNodeConfig::atomic("walk"))
                .on("POWER_OUTAGE", TransitionConfig::new().internal(true))
                .entry(vec![Action::Custom { kind: "entry_red".to_string() }]),
        )
        .child(StateNodeConfig::atomic("green"));
    MachineBuilder::new("internal_external", root).build(MachineOptions::new(), json!({})).unwrap()
}

#[test]
fn scenario_2_internal_transition_does_not_exit_or_reenter() {
    let machine = internal_vs_external_machine();
    let state = machine.initial_state(None).unwrap();
    assert_eq!(
        state.value,
        StateValue::Nested(BTreeMap::from([("red".to_string(), StateValue::Leaf("walk".to_string()))]))
    );

    let next = machine.transition(&state, "POWER_OUTAGE", None).unwrap();
    assert_eq!(next.value, state.value, "internal transition on `red` leaves `walk` untouched");
    assert!(
        !next.actions.iter().any(|a| matches!(a, Action::Custom { kind } if kind == "entry_red")),
        "an internal self-transition must not re-run `red`'s entry actions"
    );
}

fn parallel_machine() -> gearbox::Machine {
    let root = StateNodeConfig::parallel("(machine)")
        .child(
            StateNodeConfig::compound("a", "a1")
                .child(StateNodeConfig::atomic("a1").on("CHANGE", TransitionConfig::new().target("a2")))
                .child(StateNodeConfig::atomic("a2")),
        )
        .child(
            StateNodeConfig::compound("b", "b1")
                .child(StateNodeConfig::atomic("b1").on("CHANGE", TransitionConfig::new().target("b2")))
                .child(StateNodeConfig::atomic("b2")),
        );
    MachineBuilder::new("parallel", root).build(MachineOptions::new(), json!({})).unwrap()
}

#[test]
fn scenario_3_parallel_regions_transition_orthogonally() {
    let machine = parallel_machine();
    let state = machine.initial_state(None).unwrap();
    let next = machine.transition(&state, "CHANGE", None).unwrap();

    let expected = StateValue::Nested(BTreeMap::from([
        ("a".to_string(), StateValue::Leaf("a2".to_string())),
        ("b".to_string(), StateValue::Leaf("b2".to_string())),
    ]));
    assert_eq!(next.value, expected);

    // Entry order follows document order: region `a`'s target enters before `b`'s.
    let entered_keys: Vec<String> = next
        .transitions
        .iter()
        .flat_map(|t| t.targets.iter())
        .map(|&id| machine.definition.node(id).key.clone())
        .collect();
    let a_pos = entered_keys.iter().position(|k| k == "a2");
    let b_pos = entered_keys.iter().position(|k| k == "b2");
    assert!(a_pos < b_pos, "region a's transition is taken before region b's");
}

#[test]
fn scenario_3b_parallel_regions_transition_independently() {
    // A region firing CHANGE leaves the other region's own microstep
    // untouched when only one region declares a matching transition.
    let root = StateNodeConfig::parallel("(machine)")
        .child(
            StateNodeConfig::compound("a", "a1")
                .child(StateNodeConfig::atomic("a1").on("ONLY_A", TransitionConfig::new().target("a2")))
                .child(StateNodeConfig::atomic("a2")),
        )
        .child(
            StateNodeConfig::compound("b", "b1")
                .child(StateNodeConfig::atomic("b1"))
                .child(StateNodeConfig::atomic("b2")),
        );
    let machine = MachineBuilder::new("independent", root).build(MachineOptions::new(), json!({})).unwrap();
    let state = machine.initial_state(None).unwrap();
    let next = machine.transition(&state, "ONLY_A", None).unwrap();
    let expected = StateValue::Nested(BTreeMap::from([
        ("a".to_string(), StateValue::Leaf("a2".to_string())),
        ("b".to_string(), StateValue::Leaf("b1".to_string())),
    ]));
    assert_eq!(next.value, expected);
}

fn guarded_assign_machine() -> gearbox::Machine {
    let root = StateNodeConfig::compound("(machine)", "active").child(StateNodeConfig::atomic("active").on(
        "INC",
        TransitionConfig::new()
            .internal(true)
            .guard(GuardExpr::Predicate(std::sync::Arc::new(
                |ctx: &serde_json::Value, _ev, _meta| Ok(ctx["count"].as_i64().unwrap_or(0) < 10),
            )))
            .action(Action::Assign(std::sync::Arc::new(|ctx: &serde_json::Value, _ev| {
                json!({ "count": ctx["count"].as_i64().unwrap_or(0) + 1 })
            }))),
    ));
    MachineBuilder::new("guarded_assign", root).build(MachineOptions::new(), json!({"count": 0})).unwrap()
}

#[test]
fn scenario_4_guarded_assign_accumulates_and_flags_changed() {
    let machine = guarded_assign_machine();
    let mut state = machine.initial_state(None).unwrap();
    for _ in 0..3 {
        state = machine.transition(&state, "INC", None).unwrap();
        assert!(state.changed);
    }
    assert_eq!(state.context["count"], json!(3));
}

#[test]
fn scenario_4b_guard_eventually_blocks_further_assigns() {
    let machine = guarded_assign_machine();
    let mut state = machine.initial_state(Some(json!({"count": 9}))).unwrap();
    state = machine.transition(&state, "INC", None).unwrap();
    assert_eq!(state.context["count"], json!(10));
    let blocked = machine.transition(&state, "INC", None).unwrap();
    assert_eq!(blocked.context["count"], json!(10), "guard now fails, assign does not run again");
    assert!(!blocked.changed);
}

fn delayed_transition_machine() -> gearbox::Machine {
    let root = StateNodeConfig::compound("(machine)", "yellow")
        .child(
            StateNodeConfig::atomic("yellow")
                .after(DelayRef::Millis(1000), TransitionConfig::new().target("red"))
                .on("MANUAL", TransitionConfig::new().target("red")),
        )
        .child(StateNodeConfig::atomic("red"));
    MachineBuilder::new("delayed", root).build(MachineOptions::new(), json!({})).unwrap()
}

#[test]
fn scenario_5_delayed_transition_fires_on_synthesized_event() {
    let machine = delayed_transition_machine();
    let state = machine.initial_state(None).unwrap();

    // Entering `yellow` schedules the delayed send.
    assert!(state.actions.iter().any(|a| matches!(a, Action::Send { delay: Some(DelayRef::Millis(1000)), .. })));

    let after_event_name = state
        .actions
        .iter()
        .find_map(|a| match a {
            Action::Send { event, delay: Some(DelayRef::Millis(1000)), .. } => Some(event.clone()),
            _ => None,
        })
        .expect("a delayed send was scheduled on entry");

    let fired = machine.transition(&state, after_event_name.as_str(), None).unwrap();
    assert_eq!(fired.value, StateValue::Leaf("red".to_string()));
}

#[test]
fn scenario_5b_leaving_early_emits_a_cancel() {
    let machine = delayed_transition_machine();
    let state = machine.initial_state(None).unwrap();
    let left_early = machine.transition(&state, "MANUAL", None).unwrap();
    assert_eq!(left_early.value, StateValue::Leaf("red".to_string()));
    assert!(
        left_early.actions.iter().any(|a| matches!(a, Action::Cancel { .. })),
        "leaving `yellow` before the delay elapses cancels the scheduled send"
    );
}

fn parallel_final_machine() -> gearbox::Machine {
    let root = StateNodeConfig::parallel("(machine)")
        .child(
            StateNodeConfig::compound("a", "a_running")
                .child(StateNodeConfig::atomic("a_running").on("A_DONE", TransitionConfig::new().target("a_final")))
                .child(StateNodeConfig::final_state("a_final")),
        )
        .child(
            StateNodeConfig::compound("b", "b_running")
                .child(StateNodeConfig::atomic("b_running").on("B_DONE", TransitionConfig::new().target("b_final")))
                .child(StateNodeConfig::final_state("b_final")),
        )
        .on(
            "done.state.(machine)",
            TransitionConfig::new().action(Action::Custom { kind: "all_regions_done".to_string() }),
        );
    MachineBuilder::new("parallel_final", root).build(MachineOptions::new(), json!({})).unwrap()
}

#[test]
fn scenario_6_done_event_propagates_once_all_parallel_regions_finish() {
    let machine = parallel_final_machine();
    let state = machine.initial_state(None).unwrap();

    let one_region_done = machine.transition(&state, "A_DONE", None).unwrap();
    assert!(
        !one_region_done.actions.iter().any(|a| matches!(a, Action::Custom { kind } if kind == "all_regions_done")),
        "only one region finished, the parent isn't done yet"
    );

    let both_done = machine.transition(&one_region_done, "B_DONE", None).unwrap();
    assert!(
        both_done.actions.iter().any(|a| matches!(a, Action::Custom { kind } if kind == "all_regions_done")),
        "done.state.(machine) fires in the same macrostep both regions finish"
    );
    assert!(both_done.done(&machine.definition));
}

#[test]
fn order_law_every_exit_precedes_every_unrelated_entry() {
    // A transition between two top-level siblings: `from`'s exit action must
    // be emitted before `to`'s entry action.
    let root = StateNodeConfig::compound("(machine)", "from")
        .child(
            StateNodeConfig::atomic("from")
                .exit(vec![Action::Custom { kind: "exit_from".to_string() }])
                .on("GO", TransitionConfig::new().target("to")),
        )
        .child(StateNodeConfig::atomic("to").entry(vec![Action::Custom { kind: "entry_to".to_string() }]));
    let machine = MachineBuilder::new("order", root).build(MachineOptions::new(), json!({})).unwrap();
    let state = machine.initial_state(None).unwrap();
    let next = machine.transition(&state, "GO", None).unwrap();

    let exit_pos = next.actions.iter().position(|a| matches!(a, Action::Custom { kind } if kind == "exit_from"));
    let entry_pos = next.actions.iter().position(|a| matches!(a, Action::Custom { kind } if kind == "entry_to"));
    assert!(exit_pos < entry_pos);
}

#[test]
fn deep_history_restores_the_full_active_subtree() {
    let root = StateNodeConfig::compound("(machine)", "on")
        .child(
            StateNodeConfig::compound("on", "nested")
                .child(
                    StateNodeConfig::compound("nested", "inner_a")
                        .child(StateNodeConfig::atomic("inner_a").on("SWITCH", TransitionConfig::new().target("inner_b")))
                        .child(StateNodeConfig::atomic("inner_b")),
                )
                .child(gearbox::machine::StateNodeConfig::history(
                    "hist",
                    gearbox::node::HistoryKind::Deep,
                    None,
                ))
                .on("OFF", TransitionConfig::new().target("off")),
        )
        .child(StateNodeConfig::atomic("off").on("ON", TransitionConfig::new().target("on.hist")));

    let machine = MachineBuilder::new("deep_history", root).build(MachineOptions::new(), json!({})).unwrap();
    let state = machine.initial_state(None).unwrap();
    let switched = machine.transition(&state, "SWITCH", None).unwrap();
    let off = machine.transition(&switched, "OFF", None).unwrap();
    let restored = machine.transition(&off, "ON", None).unwrap();

    assert!(
        restored.to_strings(".").iter().any(|s| s.ends_with("inner_b")),
        "deep history restores the exact leaf that was active, not `nested`'s own initial"
    );
}

#[test]
fn forbidden_transition_leaves_configuration_and_context_untouched() {
    let machine = traffic_light();
    let state = machine.initial_state(None).unwrap();
    let next = machine.transition(&state, "BOGUS_EVENT", None).unwrap();
    assert_eq!(next.value, state.value);
    assert_eq!(next.context, state.context);
    assert!(!next.changed);
}

#[test]
fn wildcard_never_matches_the_null_event() {
    // A wildcard handler must not fire from the transient (no-event) drain,
    // only from a real named external event.
    let root = StateNodeConfig::compound("(machine)", "a").child(StateNodeConfig::atomic("a").on(
        "*",
        TransitionConfig::new().action(Action::Custom { kind: "wildcard_fired".to_string() }),
    ));
    let machine = MachineBuilder::new("wildcard", root).build(MachineOptions::new(), json!({})).unwrap();
    let state = machine.initial_state(None).unwrap();
    assert!(
        !state.actions.iter().any(|a| matches!(a, Action::Custom { kind } if kind == "wildcard_fired")),
        "the wildcard transition must not fire during initial-state construction (a null-event drain)"
    );

    let next = machine.transition(&state, "ANYTHING", None).unwrap();
    assert!(next.actions.iter().any(|a| matches!(a, Action::Custom { kind } if kind == "wildcard_fired")));
}
