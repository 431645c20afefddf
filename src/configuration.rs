//! Configuration Algebra (§4.1): the operations over "which nodes are
//! currently active" that the Selector, Resolver and Step Engine build on.

use std::collections::BTreeSet;

use crate::node::{Definition, NodeId, NodeKind};

/// The set of currently active nodes. A `BTreeSet<NodeId>` sorts ascending
/// by `NodeId`, which is document order, so iterating a `Configuration`
/// already yields nodes in entry order; `.iter().rev()` gives exit order.
pub type Configuration = BTreeSet<NodeId>;

/// `node`'s ancestors from its immediate parent up to the root, nearest
/// first. Does not include `node` itself.
pub fn proper_ancestors(def: &Definition, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut cur = def.node(node).parent;
    while let Some(p) = cur {
        out.push(p);
        cur = def.node(p).parent;
    }
    out
}

/// `true` if `ancestor` is a strict ancestor of `node` (not equal to it).
pub fn is_descendant(def: &Definition, node: NodeId, ancestor: NodeId) -> bool {
    proper_ancestors(def, node).contains(&ancestor)
}

/// All descendants of `node` (not including `node` itself), in document order.
pub fn descendants(def: &Definition, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = def.node(node).children.clone();
    stack.reverse();
    while let Some(n) = stack.pop() {
        out.push(n);
        let mut children = def.node(n).children.clone();
        children.reverse();
        stack.extend(children);
    }
    out.sort();
    out
}

/// All atomic/final descendants of `node` (or `node` itself if it already is one).
pub fn leaf_descendants(def: &Definition, node: NodeId) -> Vec<NodeId> {
    if def.node(node).is_atomic() {
        return vec![node];
    }
    descendants(def, node)
        .into_iter()
        .filter(|&n| def.node(n).is_atomic())
        .collect()
}

fn is_valid_lcca(def: &Definition, id: NodeId) -> bool {
    id == def.root || def.node(id).is_compound()
}

/// Least common compound ancestor of a set of nodes: the closest shared
/// ancestor (via each node's *proper* ancestor chain, so a node is never
/// its own ancestor) whose type is compound, or the root.
pub fn lcca_of_set(def: &Definition, ids: &[NodeId]) -> NodeId {
    assert!(!ids.is_empty(), "lcca_of_set requires at least one node");
    let mut candidates: BTreeSet<NodeId> = proper_ancestors(def, ids[0]).into_iter().collect();
    for &id in &ids[1..] {
        let anc: BTreeSet<NodeId> = proper_ancestors(def, id).into_iter().collect();
        candidates = candidates.intersection(&anc).copied().collect();
    }
    candidates
        .into_iter()
        .filter(|&c| is_valid_lcca(def, c))
        .max_by_key(|c| def.node(*c).order)
        .unwrap_or(def.root)
}

/// The transition domain (SCXML terminology): the node whose descendants
/// are exited/re-entered by a transition. `None` for a targetless transition.
pub fn transition_domain(
    def: &Definition,
    source: NodeId,
    targets: &[NodeId],
    internal: bool,
) -> Option<NodeId> {
    if targets.is_empty() {
        return None;
    }
    if internal
        && def.node(source).is_compound()
        && targets.iter().all(|&t| is_descendant(def, t, source))
    {
        return Some(source);
    }
    let mut all = targets.to_vec();
    all.push(source);
    Some(lcca_of_set(def, &all))
}

/// Active members of `cfg` that a transition out of `source` into `targets`
/// removes, in exit order (descending: deepest/innermost first).
pub fn exit_set(
    def: &Definition,
    cfg: &Configuration,
    source: NodeId,
    targets: &[NodeId],
    internal: bool,
) -> Vec<NodeId> {
    let Some(domain) = transition_domain(def, source, targets, internal) else {
        return Vec::new();
    };
    let mut exits: Vec<NodeId> = cfg
        .iter()
        .copied()
        .filter(|&s| is_descendant(def, s, domain))
        .collect();
    exits.sort_by(|a, b| b.cmp(a));
    exits
}

/// One resolved transition, for combined entry/exit computation across a
/// whole microstep (possibly several transitions firing in different
/// parallel regions at once).
pub struct ResolvedTransition {
    pub source: NodeId,
    /// Targets already substituted for history nodes (§4.5); used for entry
    /// descent. Exit/domain computation uses `raw_targets` instead, since a
    /// history pseudostate's own document position is what matters there.
    pub targets: Vec<NodeId>,
    pub raw_targets: Vec<NodeId>,
    pub internal: bool,
}

fn add_descendant_states_to_enter(def: &Definition, state: NodeId, entering: &mut BTreeSet<NodeId>) {
    entering.insert(state);
    match def.node(state).kind {
        NodeKind::Compound => {
            if let Some(initial) = def.node(state).initial {
                add_descendant_states_to_enter(def, initial, entering);
                add_ancestor_states_to_enter(def, initial, state, entering);
            }
        }
        NodeKind::Parallel => {
            for &child in &def.node(state).children {
                if !entering.iter().any(|&e| e == child || is_descendant(def, e, child)) {
                    add_descendant_states_to_enter(def, child, entering);
                }
            }
        }
        _ => {}
    }
}

fn add_ancestor_states_to_enter(
    def: &Definition,
    state: NodeId,
    ancestor: NodeId,
    entering: &mut BTreeSet<NodeId>,
) {
    let mut cur = def.node(state).parent;
    while let Some(a) = cur {
        if a == ancestor {
            break;
        }
        entering.insert(a);
        if def.node(a).is_parallel() {
            for &child in &def.node(a).children {
                if !entering.iter().any(|&e| e == child || is_descendant(def, e, child)) {
                    add_descendant_states_to_enter(def, child, entering);
                }
            }
        }
        cur = def.node(a).parent;
    }
}

/// The union of entry sets of every transition firing this microstep,
/// sorted ascending (outermost first) by document order.
pub fn entry_set(def: &Definition, transitions: &[ResolvedTransition]) -> Vec<NodeId> {
    let mut entering: BTreeSet<NodeId> = BTreeSet::new();
    for t in transitions {
        let domain = transition_domain(def, t.source, &t.raw_targets, t.internal).unwrap_or(t.source);
        for &target in &t.targets {
            add_descendant_states_to_enter(def, target, &mut entering);
        }
        for &target in &t.targets {
            add_ancestor_states_to_enter(def, target, domain, &mut entering);
        }
    }
    entering.into_iter().collect()
}

/// `true` if every leaf descendant of `node` currently in `cfg` is a
/// `final` node (§3 `State.done`, spec.md §4.4's done-event propagation).
pub fn is_in_final_state(def: &Definition, cfg: &Configuration, node: NodeId) -> bool {
    match def.node(node).kind {
        NodeKind::Final => true,
        NodeKind::Atomic => false,
        NodeKind::Compound => def
            .node(node)
            .children
            .iter()
            .any(|&c| cfg.contains(&c) && is_in_final_state(def, cfg, c)),
        NodeKind::Parallel => def.node(node).children.iter().all(|&c| is_in_final_state(def, cfg, c)),
        NodeKind::History(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, StateNode};
    use serde_json::Map;

    fn leaf(id: u32, parent: NodeId, key: &str, order: u32) -> StateNode {
        StateNode {
            id: NodeId(id),
            key: key.to_string(),
            path: vec![key.to_string()],
            kind: NodeKind::Atomic,
            order,
            parent: Some(parent),
            children: vec![],
            initial: None,
            history_target: None,
            entry: vec![],
            exit: vec![],
            transitions: vec![],
            invocations: vec![],
            meta: Map::new(),
            data: None,
        }
    }

    /// root(compound) -> { a(atomic), b(compound) -> { b1(atomic), b2(atomic) } }
    fn sample_definition() -> Definition {
        let root = StateNode {
            id: NodeId(0),
            key: "(machine)".to_string(),
            path: vec![],
            kind: NodeKind::Compound,
            order: 0,
            parent: None,
            children: vec![NodeId(1), NodeId(2)],
            initial: Some(NodeId(1)),
            history_target: None,
            entry: vec![],
            exit: vec![],
            transitions: vec![],
            invocations: vec![],
            meta: Map::new(),
            data: None,
        };
        let a = leaf(1, NodeId(0), "a", 1);
        let mut b = leaf(2, NodeId(0), "b", 2);
        b.kind = NodeKind::Compound;
        b.children = vec![NodeId(3), NodeId(4)];
        b.initial = Some(NodeId(3));
        let b1 = leaf(3, NodeId(2), "b1", 3);
        let b2 = leaf(4, NodeId(2), "b2", 4);
        Definition {
            key: "test".to_string(),
            nodes: vec![root, a, b, b1, b2],
            root: NodeId(0),
            delimiter: ".".to_string(),
            strict: false,
            history_children: Default::default(),
            warnings: vec![],
            declared_events: Default::default(),
        }
    }

    #[test]
    fn lcca_of_siblings_is_root() {
        let def = sample_definition();
        assert_eq!(lcca_of_set(&def, &[NodeId(1), NodeId(3)]), NodeId(0));
    }

    #[test]
    fn lcca_within_compound_child_is_that_child() {
        let def = sample_definition();
        // self-loop candidate: b1 -> b2, both under b
        assert_eq!(lcca_of_set(&def, &[NodeId(3), NodeId(4)]), NodeId(2));
    }

    #[test]
    fn exit_set_external_self_transition_exits_and_reenters() {
        let def = sample_definition();
        let mut cfg = Configuration::new();
        cfg.insert(NodeId(0));
        cfg.insert(NodeId(1));
        let exits = exit_set(&def, &cfg, NodeId(1), &[NodeId(1)], false);
        assert_eq!(exits, vec![NodeId(1)]);
    }
}
