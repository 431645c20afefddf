//! Step Engine (§4.4): the run-to-completion macrostep loop around one
//! external event, draining transient (null-event) and internally-raised
//! events before returning the next observable `State`.

use std::collections::VecDeque;

use tracing::{debug, error, trace};

use crate::configuration::{entry_set, Configuration, ResolvedTransition};
use crate::error::GearboxError;
use crate::event::{Context, EventData, EventInput, INIT_EVENT};
use crate::history::{record_history, HistoryMap};
use crate::machine::Machine;
use crate::node::{Action, Definition, TransitionDef};
use crate::resolver::{done_events_for_entry, process_actions, resolve_microstep};
use crate::selector::select_transitions;
use crate::state::State;
use crate::state_value::configuration_to_state_value;

pub fn transition(machine: &Machine, state: &State, event: impl Into<EventInput>) -> Result<State, GearboxError> {
    let original_event = event.into().into_event_data();
    let def = &machine.definition;

    let mut cfg: Configuration = state.configuration.clone();
    let mut context: Context = state.context.clone();
    let mut history: HistoryMap = state.history_value.clone();
    let mut emitted_actions: Vec<Action> = Vec::new();
    let mut taken_transitions: Vec<TransitionDef> = Vec::new();
    let mut assign_ran = false;

    let mut pending: VecDeque<EventData> = VecDeque::new();
    pending.push_back(original_event.clone());

    drain_queue(
        def,
        &machine.options,
        &mut cfg,
        &mut context,
        &mut history,
        &mut pending,
        &mut emitted_actions,
        &mut taken_transitions,
        &mut assign_ran,
    )?;

    let value = configuration_to_state_value(def, &cfg);
    let changed = assign_ran || value != state.value || !emitted_actions.is_empty();

    let mut prev = state.clone();
    prev.history_value = HistoryMap::new();

    debug!(target: "gearbox", event = %original_event.name, changed, "macrostep complete");

    Ok(State {
        value,
        context,
        event: original_event,
        history_value: history,
        prev_state: Some(Box::new(prev)),
        actions: emitted_actions,
        transitions: taken_transitions,
        meta: crate::state::collect_meta(def, &cfg),
        configuration: cfg,
        changed,
    })
}

/// Computes the machine's initial `State`: the entry set from the root down
/// through every `initial`/parallel-region chain, with entry actions run and
/// any resulting transient/internal events drained to quiescence (§6
/// `Machine.initial_state`). The observable `event` is `xstate.init`.
pub fn initial(machine: &Machine, context: Context) -> Result<State, GearboxError> {
    let def = &machine.definition;
    let init_event = EventData::named(INIT_EVENT);

    let resolved = [ResolvedTransition {
        source: def.root,
        targets: vec![def.root],
        raw_targets: vec![def.root],
        internal: false,
    }];
    let entry_nodes = entry_set(def, &resolved);

    let mut cfg: Configuration = entry_nodes.iter().copied().collect();

    let mut raw_actions = Vec::new();
    for &n in &entry_nodes {
        raw_actions.extend(def.node(n).entry.iter().cloned());
    }

    let (mut emitted_actions, mut context, mut pending, mut assign_ran) =
        process_actions(raw_actions, &context, &init_event, &machine.options)?;
    pending.extend(done_events_for_entry(def, &entry_nodes, &cfg));

    let mut history: HistoryMap = HistoryMap::new();
    let mut taken_transitions: Vec<TransitionDef> = Vec::new();

    drain_queue(
        def,
        &machine.options,
        &mut cfg,
        &mut context,
        &mut history,
        &mut pending,
        &mut emitted_actions,
        &mut taken_transitions,
        &mut assign_ran,
    )?;

    let value = configuration_to_state_value(def, &cfg);

    debug!(target: "gearbox", "initial state computed");

    Ok(State {
        value,
        context,
        event: init_event,
        history_value: history,
        prev_state: None,
        actions: emitted_actions,
        transitions: taken_transitions,
        meta: crate::state::collect_meta(def, &cfg),
        configuration: cfg,
        changed: assign_ran,
    })
}

/// Drains `pending` (FIFO), and after each dequeued event (and once before
/// the first), repeatedly fires eventless/transient transitions until none
/// remain, per §4.4 steps 3-4.
#[allow(clippy::too_many_arguments)]
fn drain_queue(
    def: &Definition,
    options: &crate::options::MachineOptions,
    cfg: &mut Configuration,
    context: &mut Context,
    history: &mut HistoryMap,
    pending: &mut VecDeque<EventData>,
    emitted_actions: &mut Vec<Action>,
    taken_transitions: &mut Vec<TransitionDef>,
    assign_ran: &mut bool,
) -> Result<(), GearboxError> {
    drain_transients(def, options, cfg, context, history, pending, emitted_actions, taken_transitions, assign_ran)?;

    while let Some(ev) = pending.pop_front() {
        apply_one(
            def,
            options,
            cfg,
            context,
            history,
            ev,
            pending,
            emitted_actions,
            taken_transitions,
            assign_ran,
        )?;
        drain_transients(def, options, cfg, context, history, pending, emitted_actions, taken_transitions, assign_ran)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn drain_transients(
    def: &Definition,
    options: &crate::options::MachineOptions,
    cfg: &mut Configuration,
    context: &mut Context,
    history: &mut HistoryMap,
    pending: &mut VecDeque<EventData>,
    emitted_actions: &mut Vec<Action>,
    taken_transitions: &mut Vec<TransitionDef>,
    assign_ran: &mut bool,
) -> Result<(), GearboxError> {
    loop {
        let null_event = EventData::null();
        let selected = select_transitions(def, cfg, &null_event, context, options)?;
        if selected.is_empty() {
            break;
        }
        trace!(target: "gearbox", count = selected.len(), "draining transient transitions");
        apply_one(
            def,
            options,
            cfg,
            context,
            history,
            null_event,
            pending,
            emitted_actions,
            taken_transitions,
            assign_ran,
        )?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_one(
    def: &Definition,
    options: &crate::options::MachineOptions,
    cfg: &mut Configuration,
    context: &mut Context,
    history: &mut HistoryMap,
    event: EventData,
    queue: &mut VecDeque<EventData>,
    emitted_actions: &mut Vec<Action>,
    taken_transitions: &mut Vec<TransitionDef>,
    assign_ran: &mut bool,
) -> Result<(), GearboxError> {
    let selected = select_transitions(def, cfg, &event, context, options).map_err(|e| {
        error!(target: "gearbox", event = %event.name, error = %e, "microstep discarded: selector failed");
        e
    })?;
    if selected.is_empty() {
        return Ok(());
    }

    debug!(target: "gearbox", event = %event.name, count = selected.len(), "selected transitions");

    let old_cfg = cfg.clone();
    let micro = resolve_microstep(def, cfg, context, &event, &selected, history, options).map_err(|e| {
        error!(target: "gearbox", event = %event.name, error = %e, "microstep discarded: resolver failed");
        e
    })?;

    for t in &selected {
        taken_transitions.push(t.def(def).clone());
    }
    emitted_actions.extend(micro.actions);
    for e in micro.internal_events {
        queue.push_back(e);
    }
    record_history(def, history, &old_cfg, &micro.exit);
    *cfg = micro.next_configuration;
    *context = micro.next_context;
    if micro.assign_ran {
        *assign_ran = true;
    }
    Ok(())
}
