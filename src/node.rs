//! Definition Model: the immutable tree of state nodes, transitions and
//! actions that a [`crate::machine::Machine`] is built from.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::{Context, EventData};
use crate::guards::GuardExpr;

/// Index of a [`StateNode`] in a [`Definition`]'s arena. Assigned during
/// construction as the node's pre-order depth-first position, so `NodeId`
/// ordering *is* document order: comparing two ids is equivalent to
/// comparing their `order` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Atomic,
    Compound,
    Parallel,
    History(HistoryKind),
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryKind {
    Shallow,
    Deep,
}

/// A reference to a named or literal delay, used by [`Action::Send`] and
/// resolved against `MachineOptions::delays` when the send is actually
/// emitted (§4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum DelayRef {
    Millis(u64),
    Named(String),
}

/// The pattern an incoming event name is matched against (§3, §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventPattern {
    /// Concrete event name.
    Named(String),
    /// The NULL/eventless pattern: matches only the null-event, never the wildcard.
    Null,
    /// `*`: matches any non-null event.
    Wildcard,
}

impl EventPattern {
    pub fn matches(&self, event_name: &str) -> bool {
        match self {
            EventPattern::Null => event_name.is_empty(),
            EventPattern::Named(n) => n == event_name,
            EventPattern::Wildcard => !event_name.is_empty(),
        }
    }
}

/// A side effect or context mutation attached to a transition, or to a
/// node's `entry`/`exit` lists (§3).
#[derive(Clone)]
pub enum Action {
    Send {
        event: String,
        delay: Option<DelayRef>,
        id: Option<String>,
    },
    Raise {
        event: String,
    },
    Log {
        label: Option<String>,
    },
    /// Pure context mutation: `(context, event) -> next_context`. Folded
    /// into the next context by the Action Resolver; never appears in the
    /// emitted action list (§4.3 step 6).
    Assign(AssignFn),
    Start(String),
    Stop(String),
    Invoke {
        id: String,
        src: String,
    },
    Cancel {
        send_id: String,
    },
    /// `(context, event) -> [Action]`, spliced in place, one level deep (§4.3 step 8).
    Pure(PureFn),
    /// Resolved against `MachineOptions::actions` at microstep time; the
    /// looked-up function has the same shape as [`Action::Pure`]. This is
    /// the late-binding-by-name mechanism of §9.
    Named(String),
    /// Opaque action forwarded verbatim into the emitted list; the core
    /// never executes it.
    Custom {
        kind: String,
    },
}

pub type AssignFn = std::sync::Arc<dyn Fn(&Context, &EventData) -> Context + Send + Sync>;
pub type PureFn = std::sync::Arc<dyn Fn(&Context, &EventData) -> Vec<Action> + Send + Sync>;

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Send { event, delay, id } => f
                .debug_struct("Send")
                .field("event", event)
                .field("delay", delay)
                .field("id", id)
                .finish(),
            Action::Raise { event } => f.debug_struct("Raise").field("event", event).finish(),
            Action::Log { label } => f.debug_struct("Log").field("label", label).finish(),
            Action::Assign(_) => f.write_str("Assign(..)"),
            Action::Start(id) => f.debug_tuple("Start").field(id).finish(),
            Action::Stop(id) => f.debug_tuple("Stop").field(id).finish(),
            Action::Invoke { id, src } => {
                f.debug_struct("Invoke").field("id", id).field("src", src).finish()
            }
            Action::Cancel { send_id } => f.debug_struct("Cancel").field("send_id", send_id).finish(),
            Action::Pure(_) => f.write_str("Pure(..)"),
            Action::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Action::Custom { kind } => f.debug_struct("Custom").field("kind", kind).finish(),
        }
    }
}

/// One outbound edge in document order (§3 `TransitionDef`).
#[derive(Clone, Debug)]
pub struct TransitionDef {
    pub event_pattern: EventPattern,
    pub guard: Option<GuardExpr>,
    pub in_state: Option<NodeId>,
    pub targets: Vec<NodeId>,
    pub actions: Vec<Action>,
    pub internal: bool,
}

/// An opaque external service invocation (§3; execution is out of scope, §1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub id: String,
}

/// A node of the immutable definition tree.
#[derive(Debug, Clone)]
pub struct StateNode {
    pub id: NodeId,
    pub key: String,
    pub path: Vec<String>,
    pub kind: NodeKind,
    pub order: u32,
    pub parent: Option<NodeId>,
    /// Direct children in document order.
    pub children: Vec<NodeId>,
    /// Compound nodes only: the child entered by default.
    pub initial: Option<NodeId>,
    /// History nodes only: the target used when no stored history value exists.
    pub history_target: Option<NodeId>,
    pub entry: Vec<Action>,
    pub exit: Vec<Action>,
    pub transitions: Vec<TransitionDef>,
    pub invocations: Vec<Invocation>,
    pub meta: Map<String, Value>,
    /// Final states only: the `data` expression result.
    pub data: Option<Value>,
}

impl StateNode {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic | NodeKind::Final)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.kind, NodeKind::Compound)
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, NodeKind::Parallel)
    }

    pub fn history_kind(&self) -> Option<HistoryKind> {
        match self.kind {
            NodeKind::History(k) => Some(k),
            _ => None,
        }
    }
}

/// The immutable arena a [`crate::machine::Machine`] is built around.
/// `nodes[id.index()]` is always the node for `id`; `NodeId`s are
/// pre-order-DFS indices, so `nodes` is already sorted by document order.
#[derive(Debug, Clone)]
pub struct Definition {
    pub key: String,
    pub nodes: Vec<StateNode>,
    pub root: NodeId,
    pub delimiter: String,
    pub strict: bool,
    /// `parent node id -> history-kind children`, precomputed so the Step
    /// Engine can record history in O(exit set size) rather than scanning
    /// every node each macrostep.
    pub history_children: HashMap<NodeId, Vec<NodeId>>,
    /// Non-fatal issues recorded at construction time (§7): missing
    /// `initial` on a compound (falls back to treating it as a leaf),
    /// unreachable guarded transitions, deprecated config keys.
    pub warnings: Vec<String>,
    /// Every concrete (non-wildcard, non-null) event name named by some
    /// transition in the tree, plus the built-in names. Used by strict-mode
    /// machines to reject `transition()` calls for unrecognized events (§6).
    pub declared_events: HashSet<String>,
}

impl Definition {
    #[inline]
    pub fn node(&self, id: NodeId) -> &StateNode {
        &self.nodes[id.index()]
    }

    pub fn node_by_id_str(&self, id: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.key == id).map(|n| n.id)
    }

    pub fn node_by_path(&self, path: &[String]) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.path == path).map(|n| n.id)
    }
}
