//! Action Resolver (§4.3): turns a set of selected transitions into the
//! concrete exit/entry sets, the ordered emitted action list, the folded
//! context, and any events raised for the Step Engine's internal queue.

use std::collections::{HashSet, VecDeque};

use crate::configuration::{entry_set, exit_set, Configuration, ResolvedTransition};
use crate::error::GearboxError;
use crate::event::{done_state_event_name, Context, EventData};
use crate::history::{resolve_targets, HistoryMap};
use crate::node::{Action, Definition, DelayRef, NodeId, NodeKind};
use crate::options::MachineOptions;
use crate::selector::SelectedTransition;

pub struct Microstep {
    pub exit: Vec<NodeId>,
    pub entry: Vec<NodeId>,
    /// Observable side-effect actions, in exit -> transition -> entry order.
    pub actions: Vec<Action>,
    pub next_context: Context,
    pub internal_events: VecDeque<EventData>,
    pub next_configuration: Configuration,
    pub assign_ran: bool,
}

pub fn resolve_microstep(
    def: &Definition,
    cfg: &Configuration,
    context: &Context,
    event: &EventData,
    selected: &[SelectedTransition],
    history: &HistoryMap,
    options: &MachineOptions,
) -> Result<Microstep, GearboxError> {
    let mut resolved: Vec<ResolvedTransition> = Vec::with_capacity(selected.len());
    for s in selected {
        let t = s.def(def);
        let targets = resolve_targets(def, history, &t.targets);
        resolved.push(ResolvedTransition {
            source: s.source,
            targets,
            raw_targets: t.targets.clone(),
            internal: t.internal,
        });
    }

    let mut exit_nodes: Vec<NodeId> = Vec::new();
    let mut exit_seen: HashSet<NodeId> = HashSet::new();
    for s in selected {
        let t = s.def(def);
        for n in exit_set(def, cfg, s.source, &t.targets, t.internal) {
            if exit_seen.insert(n) {
                exit_nodes.push(n);
            }
        }
    }
    exit_nodes.sort_by(|a, b| b.cmp(a));

    let entry_nodes = entry_set(def, &resolved);

    let mut next_cfg = cfg.clone();
    for n in &exit_nodes {
        next_cfg.remove(n);
    }
    for n in &entry_nodes {
        next_cfg.insert(*n);
    }

    let mut raw_actions: Vec<Action> = Vec::new();
    for &n in &exit_nodes {
        raw_actions.extend(def.node(n).exit.iter().cloned());
    }
    for s in selected {
        raw_actions.extend(s.def(def).actions.iter().cloned());
    }
    for &n in &entry_nodes {
        raw_actions.extend(def.node(n).entry.iter().cloned());
    }

    let (emitted, next_context, internal_events, assign_ran) =
        process_actions(raw_actions, context, event, options)?;

    let mut internal_events = internal_events;
    internal_events.extend(done_events_for_entry(def, &entry_nodes, &next_cfg));

    Ok(Microstep {
        exit: exit_nodes,
        entry: entry_nodes,
        actions: emitted,
        next_context,
        internal_events,
        next_configuration: next_cfg,
        assign_ran,
    })
}

/// Computes the `done.state.<id>` events raised by entering `entry_nodes`
/// (§4.3 step 5): one for every entered `final` node's parent, and one more
/// for each enclosing `parallel` ancestor whose regions are now all in
/// final state, walking outward while that keeps holding.
pub fn done_events_for_entry(
    def: &Definition,
    entry_nodes: &[NodeId],
    next_cfg: &Configuration,
) -> VecDeque<EventData> {
    let mut internal_events = VecDeque::new();
    for &n in entry_nodes {
        if !matches!(def.node(n).kind, NodeKind::Final) {
            continue;
        }
        let Some(parent) = def.node(n).parent else { continue };
        internal_events.push_back(EventData {
            name: done_state_event_name(&def.node(parent).key),
            data: def.node(n).data.clone().unwrap_or(serde_json::Value::Null),
        });

        let mut cur = parent;
        loop {
            let Some(grandparent) = def.node(cur).parent else { break };
            if !matches!(def.node(grandparent).kind, NodeKind::Parallel) {
                break;
            }
            if !crate::configuration::is_in_final_state(def, next_cfg, grandparent) {
                break;
            }
            internal_events.push_back(EventData {
                name: done_state_event_name(&def.node(grandparent).key),
                data: serde_json::Value::Null,
            });
            cur = grandparent;
        }
    }
    internal_events
}

/// Expands `Pure`/`Named` actions one level deep, folds `Assign`s against
/// `context` in list order, and splits the remainder into the emitted
/// list versus events raised for the internal queue (§4.3 steps 6-8).
/// Shared between [`resolve_microstep`] and initial-state construction,
/// which runs the same pipeline over a node's `entry` actions without a
/// real selected transition behind it.
pub fn process_actions(
    raw_actions: Vec<Action>,
    context: &Context,
    event: &EventData,
    options: &MachineOptions,
) -> Result<(Vec<Action>, Context, VecDeque<EventData>, bool), GearboxError> {
    let mut expanded: Vec<Action> = Vec::with_capacity(raw_actions.len());
    for action in raw_actions {
        match action {
            Action::Pure(f) => expanded.extend(f(context, event)),
            Action::Named(name) => match options.actions.get(&name) {
                Some(f) => expanded.extend(f(context, event)),
                None => return Err(GearboxError::UnknownActionRef(name)),
            },
            other => expanded.push(other),
        }
    }

    let mut next_context = context.clone();
    let mut assign_ran = false;
    let mut internal_events: VecDeque<EventData> = VecDeque::new();
    let mut emitted: Vec<Action> = Vec::with_capacity(expanded.len());

    for action in expanded {
        match action {
            Action::Assign(f) => {
                next_context = f(&next_context, event);
                assign_ran = true;
            }
            Action::Raise { event: name } => {
                internal_events.push_back(EventData::named(name));
            }
            Action::Send { event: name, delay: None, id: _ } => {
                internal_events.push_back(EventData::named(name));
            }
            Action::Send { event: name, delay: Some(DelayRef::Named(delay_name)), id } => {
                if !options.delays.contains_key(&delay_name) {
                    return Err(GearboxError::UnresolvedDelay(delay_name));
                }
                emitted.push(Action::Send {
                    event: name,
                    delay: Some(DelayRef::Named(delay_name)),
                    id,
                });
            }
            Action::Send { event: name, delay: Some(DelayRef::Millis(ms)), id } => {
                emitted.push(Action::Send { event: name, delay: Some(DelayRef::Millis(ms)), id });
            }
            Action::Invoke { id, src } => {
                if !options.services.is_empty() && !options.services.contains(&src) {
                    return Err(GearboxError::UnknownServiceRef(src));
                }
                emitted.push(Action::Invoke { id, src });
            }
            other => emitted.push(other),
        }
    }

    Ok((emitted, next_context, internal_events, assign_ran))
}
