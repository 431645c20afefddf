//! `StateValue`: the compact, serializable view of a configuration (§3,
//! §6 `State.matches`/`State.to_strings`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;
use crate::node::{Definition, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Leaf(String),
    Nested(BTreeMap<String, StateValue>),
}

impl StateValue {
    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            StateValue::Leaf(s) => Some(s),
            StateValue::Nested(_) => None,
        }
    }
}

/// `node`'s own value, as it should appear keyed under its parent's map
/// (or as the whole `StateValue`, if `node` is the root).
fn value_of(def: &Definition, cfg: &Configuration, node: NodeId) -> StateValue {
    match def.node(node).kind {
        NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(def.node(node).key.clone()),
        NodeKind::Compound => {
            let active_child = def
                .node(node)
                .children
                .iter()
                .copied()
                .find(|c| cfg.contains(c));
            let Some(child) = active_child else {
                return StateValue::Leaf(def.node(node).key.clone());
            };
            match def.node(child).kind {
                NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(def.node(child).key.clone()),
                NodeKind::Compound | NodeKind::Parallel => {
                    let inner = value_of(def, cfg, child);
                    let mut map = BTreeMap::new();
                    map.insert(def.node(child).key.clone(), inner);
                    StateValue::Nested(map)
                }
                NodeKind::History(_) => StateValue::Leaf(def.node(child).key.clone()),
            }
        }
        NodeKind::Parallel => {
            let mut map = BTreeMap::new();
            for &child in &def.node(node).children {
                let v = match def.node(child).kind {
                    NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(def.node(child).key.clone()),
                    NodeKind::Compound | NodeKind::Parallel => value_of(def, cfg, child),
                    NodeKind::History(_) => continue,
                };
                map.insert(def.node(child).key.clone(), v);
            }
            StateValue::Nested(map)
        }
        NodeKind::History(_) => StateValue::Leaf(def.node(node).key.clone()),
    }
}

pub fn configuration_to_state_value(def: &Definition, cfg: &Configuration) -> StateValue {
    value_of(def, cfg, def.root)
}

/// Default value of `node`, following `initial` chains instead of a
/// concrete configuration. Used to fill in the parts of a partial
/// `StateValue` that [`resolve`] is not given.
fn default_value_for(def: &Definition, node: NodeId) -> StateValue {
    match def.node(node).kind {
        NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(def.node(node).key.clone()),
        NodeKind::Compound => match def.node(node).initial {
            None => StateValue::Leaf(def.node(node).key.clone()),
            Some(init) => match def.node(init).kind {
                NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(def.node(init).key.clone()),
                NodeKind::Compound | NodeKind::Parallel => {
                    let mut map = BTreeMap::new();
                    map.insert(def.node(init).key.clone(), default_value_for(def, init));
                    StateValue::Nested(map)
                }
                NodeKind::History(_) => StateValue::Leaf(def.node(init).key.clone()),
            },
        },
        NodeKind::Parallel => {
            let mut map = BTreeMap::new();
            for &child in &def.node(node).children {
                if matches!(def.node(child).kind, NodeKind::History(_)) {
                    continue;
                }
                map.insert(def.node(child).key.clone(), default_value_for(def, child));
            }
            StateValue::Nested(map)
        }
        NodeKind::History(_) => StateValue::Leaf(def.node(node).key.clone()),
    }
}

fn resolve_at(def: &Definition, node: NodeId, value: &StateValue) -> StateValue {
    match def.node(node).kind {
        NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(def.node(node).key.clone()),
        NodeKind::Compound => {
            let (child, partial): (Option<NodeId>, Option<&StateValue>) = match value {
                StateValue::Leaf(k) => (
                    def.node(node).children.iter().copied().find(|&c| &def.node(c).key == k),
                    None,
                ),
                StateValue::Nested(m) => {
                    let found = def
                        .node(node)
                        .children
                        .iter()
                        .copied()
                        .find(|&c| m.contains_key(&def.node(c).key));
                    (found, found.and_then(|c| m.get(&def.node(c).key)))
                }
            };
            let Some(child) = child.or(def.node(node).initial) else {
                return StateValue::Leaf(def.node(node).key.clone());
            };
            match def.node(child).kind {
                NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(def.node(child).key.clone()),
                NodeKind::Compound | NodeKind::Parallel => {
                    let inner = match partial {
                        Some(p) => resolve_at(def, child, p),
                        None => default_value_for(def, child),
                    };
                    let mut map = BTreeMap::new();
                    map.insert(def.node(child).key.clone(), inner);
                    StateValue::Nested(map)
                }
                NodeKind::History(_) => StateValue::Leaf(def.node(child).key.clone()),
            }
        }
        NodeKind::Parallel => {
            let mut map = BTreeMap::new();
            for &child in &def.node(node).children {
                if matches!(def.node(child).kind, NodeKind::History(_)) {
                    continue;
                }
                let key = def.node(child).key.clone();
                let partial = match value {
                    StateValue::Nested(m) => m.get(&key),
                    StateValue::Leaf(_) => None,
                };
                let v = match def.node(child).kind {
                    NodeKind::Atomic | NodeKind::Final => StateValue::Leaf(key.clone()),
                    _ => match partial {
                        Some(p) => resolve_at(def, child, p),
                        None => default_value_for(def, child),
                    },
                };
                map.insert(key, v);
            }
            StateValue::Nested(map)
        }
        NodeKind::History(_) => StateValue::Leaf(def.node(node).key.clone()),
    }
}

/// Expands a partial `StateValue` (e.g. `{"red": "walk"}` when the real
/// machine also has orthogonal regions elsewhere) into the full value
/// consistent with `def`: missing compound children and parallel regions
/// are filled in from their `initial` chain (§4.5).
pub fn resolve(def: &Definition, value: &StateValue) -> StateValue {
    resolve_at(def, def.root, value)
}

/// `true` if `partial` is satisfied by `full`: every leaf/nested key named
/// in `partial` agrees with the same position in `full`; `full` may still
/// have extra keys (other parallel regions) `partial` doesn't mention.
pub fn value_matches(full: &StateValue, partial: &StateValue) -> bool {
    match (full, partial) {
        (StateValue::Leaf(a), StateValue::Leaf(b)) => a == b,
        (StateValue::Nested(fm), StateValue::Leaf(b)) => fm.contains_key(b),
        (StateValue::Nested(fm), StateValue::Nested(pm)) => {
            pm.iter().all(|(k, v)| fm.get(k).is_some_and(|fv| value_matches(fv, v)))
        }
        (StateValue::Leaf(_), StateValue::Nested(_)) => false,
    }
}

/// Every dotted path from root to an active leaf, XState's `toStrings`.
pub fn to_strings(value: &StateValue, delimiter: &str) -> Vec<String> {
    fn walk(value: &StateValue, prefix: &str, delim: &str, out: &mut Vec<String>) {
        match value {
            StateValue::Leaf(k) => {
                out.push(if prefix.is_empty() { k.clone() } else { format!("{prefix}{delim}{k}") });
            }
            StateValue::Nested(m) => {
                for (k, v) in m {
                    let full = if prefix.is_empty() { k.clone() } else { format!("{prefix}{delim}{k}") };
                    out.push(full.clone());
                    walk(v, &full, delim, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(value, "", delimiter, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_strings_nested() {
        let mut inner = BTreeMap::new();
        inner.insert("red".to_string(), StateValue::Leaf("walk".to_string()));
        let value = StateValue::Nested(inner);
        assert_eq!(to_strings(&value, "."), vec!["red".to_string(), "red.walk".to_string()]);
    }

    #[test]
    fn matches_by_bare_key_on_nested() {
        let mut inner = BTreeMap::new();
        inner.insert("red".to_string(), StateValue::Leaf("walk".to_string()));
        let value = StateValue::Nested(inner);
        assert!(value_matches(&value, &StateValue::Leaf("red".to_string())));
        assert!(!value_matches(&value, &StateValue::Leaf("green".to_string())));
    }

    #[test]
    fn matches_partial_parallel_subset() {
        let mut full = BTreeMap::new();
        full.insert("a".to_string(), StateValue::Leaf("a2".to_string()));
        full.insert("b".to_string(), StateValue::Leaf("b2".to_string()));
        let full = StateValue::Nested(full);
        let mut partial = BTreeMap::new();
        partial.insert("a".to_string(), StateValue::Leaf("a2".to_string()));
        assert!(value_matches(&full, &StateValue::Nested(partial)));
    }
}
