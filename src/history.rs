//! History recording and resolution (§4.5).
//!
//! A history node's recorded value is the set of nodes that were active
//! under its owning compound/parallel the last time that owner was
//! exited: the immediate active children for `HistoryKind::Shallow`, or
//! every active leaf descendant for `HistoryKind::Deep`. This mirrors the
//! teacher's `HistoryState(HashSet<Entity>)` component directly rather
//! than the fully recursive `{current, children}` shape some SCXML
//! write-ups use; both pin down the same restored configuration, and the
//! flat set is what the Configuration Algebra's entry-set walk already
//! consumes.

use std::collections::{HashMap, HashSet};

use crate::configuration::{is_descendant, Configuration};
use crate::node::{Definition, HistoryKind, NodeId};

pub type HistoryMap = HashMap<NodeId, HashSet<NodeId>>;

/// Updates `history` for every history node whose owner was just exited.
pub fn record_history(
    def: &Definition,
    history: &mut HistoryMap,
    old_cfg: &Configuration,
    exited: &[NodeId],
) {
    for &owner in exited {
        let Some(hist_nodes) = def.history_children.get(&owner) else {
            continue;
        };
        for &h in hist_nodes {
            let Some(kind) = def.node(h).history_kind() else {
                continue;
            };
            let recorded: HashSet<NodeId> = match kind {
                HistoryKind::Shallow => def
                    .node(owner)
                    .children
                    .iter()
                    .copied()
                    .filter(|c| old_cfg.contains(c))
                    .collect(),
                HistoryKind::Deep => old_cfg
                    .iter()
                    .copied()
                    .filter(|&n| is_descendant(def, n, owner) && def.node(n).is_atomic())
                    .collect(),
            };
            history.insert(h, recorded);
        }
    }
}

/// Expands a transition target that is a history pseudostate into the
/// concrete nodes that should actually be entered: the stored value if
/// one exists, else the history node's own `target` if given, else its
/// owner's `initial` child.
pub fn resolve_history_target(def: &Definition, history: &HistoryMap, h: NodeId) -> Vec<NodeId> {
    if let Some(set) = history.get(&h) {
        if !set.is_empty() {
            return set.iter().copied().collect();
        }
    }
    if let Some(target) = def.node(h).history_target {
        return vec![target];
    }
    let owner = def
        .node(h)
        .parent
        .expect("history node always has an owning parent");
    match def.node(owner).initial {
        Some(initial) => vec![initial],
        None => vec![owner],
    }
}

/// Substitutes every history node in `targets` with its resolved concrete
/// targets, leaving ordinary targets untouched.
pub fn resolve_targets(def: &Definition, history: &HistoryMap, targets: &[NodeId]) -> Vec<NodeId> {
    let mut out = Vec::new();
    for &t in targets {
        if def.node(t).history_kind().is_some() {
            out.extend(resolve_history_target(def, history, t));
        } else {
            out.push(t);
        }
    }
    out
}
