//! Transition Selector (§4.2): picks, for the current configuration and
//! an incoming event, the set of transitions that will actually fire.

use std::collections::HashSet;

use crate::configuration::{exit_set, proper_ancestors, Configuration};
use crate::error::GearboxError;
use crate::event::EventData;
use crate::guards::{eval_guard, GuardMeta};
use crate::node::{Definition, NodeId, TransitionDef};
use crate::options::MachineOptions;
use crate::state_value::configuration_to_state_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectedTransition {
    pub source: NodeId,
    pub transition_index: usize,
}

impl SelectedTransition {
    pub fn def<'a>(&self, definition: &'a Definition) -> &'a TransitionDef {
        &definition.node(self.source).transitions[self.transition_index]
    }
}

/// Selects the transitions enabled by `event` in `cfg`, per atomic leaf,
/// walking each leaf's ancestor chain innermost-first and taking the
/// first transition whose event pattern, guard and `in_state` predicate
/// all pass. Conflicting selections (overlapping exit sets) are resolved
/// by preferring the transition discovered first (lower document order).
pub fn select_transitions(
    def: &Definition,
    cfg: &Configuration,
    event: &EventData,
    context: &crate::event::Context,
    options: &MachineOptions,
) -> Result<Vec<SelectedTransition>, GearboxError> {
    let state_value = configuration_to_state_value(def, cfg);

    let mut atomic_states: Vec<NodeId> = cfg
        .iter()
        .copied()
        .filter(|&n| def.node(n).is_atomic())
        .collect();
    atomic_states.sort();

    let mut enabled: Vec<SelectedTransition> = Vec::new();
    let mut seen: HashSet<SelectedTransition> = HashSet::new();

    for leaf in atomic_states {
        let mut chain = vec![leaf];
        chain.extend(proper_ancestors(def, leaf));

        'walk: for anc in chain {
            let node = def.node(anc);
            for (idx, t) in node.transitions.iter().enumerate() {
                if !t.event_pattern.matches(&event.name) {
                    continue;
                }
                if let Some(in_state) = t.in_state {
                    if !cfg.contains(&in_state) {
                        continue;
                    }
                }
                if let Some(guard) = &t.guard {
                    let meta = GuardMeta { state_value: &state_value, source: anc };
                    if !eval_guard(guard, context, event, &meta, options)? {
                        continue;
                    }
                }
                let candidate = SelectedTransition { source: anc, transition_index: idx };
                if seen.insert(candidate) {
                    enabled.push(candidate);
                }
                break 'walk;
            }
        }
    }

    Ok(remove_conflicting(def, cfg, enabled))
}

fn remove_conflicting(
    def: &Definition,
    cfg: &Configuration,
    candidates: Vec<SelectedTransition>,
) -> Vec<SelectedTransition> {
    let mut kept: Vec<SelectedTransition> = Vec::new();
    let mut kept_exits: Vec<HashSet<NodeId>> = Vec::new();

    for cand in candidates {
        let t = cand.def(def);
        let cand_exit: HashSet<NodeId> =
            exit_set(def, cfg, cand.source, &t.targets, t.internal).into_iter().collect();
        let conflicts = kept_exits.iter().any(|e| !e.is_disjoint(&cand_exit));
        if !conflicts {
            kept.push(cand);
            kept_exits.push(cand_exit);
        }
    }
    kept
}

pub(crate) fn atomic_leaves(def: &Definition, cfg: &Configuration) -> Vec<NodeId> {
    cfg.iter().copied().filter(|&n| def.node(n).is_atomic()).collect()
}

/// All event names some transition reachable from `cfg`'s leaves would
/// respond to (spec.md §6 `State.next_events`).
pub fn next_events(def: &Definition, cfg: &Configuration) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for leaf in atomic_leaves(def, cfg) {
        let mut chain = vec![leaf];
        chain.extend(proper_ancestors(def, leaf));
        for anc in chain {
            for t in &def.node(anc).transitions {
                if let crate::node::EventPattern::Named(n) = &t.event_pattern {
                    if !names.contains(n) {
                        names.push(n.clone());
                    }
                }
            }
        }
    }
    names.sort();
    names
}
