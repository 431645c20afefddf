//! Configuration / machine construction (SPEC_FULL §2.3): a fluent builder
//! that lowers a tree of [`StateNodeConfig`] into the immutable arena
//! `Definition` the rest of the crate operates on, plus the `Machine`
//! façade that implements the core API contract of spec.md §6.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::delay::{desugar_after, AfterTransitionConfig};
use crate::error::GearboxError;
use crate::event::{
    done_invoke_event_name, done_state_event_name, error_platform_event_name, Context, EventInput,
    INIT_EVENT,
};
use crate::guards::GuardExpr;
use crate::node::{
    Action, Definition, DelayRef, EventPattern, HistoryKind, Invocation, NodeId, NodeKind,
    StateNode, TransitionDef,
};
use crate::options::MachineOptions;
use crate::state::State;

/// What kind of node a [`StateNodeConfig`] describes, carrying the data
/// that only makes sense for that kind (§3 `StateNode.type`).
pub enum NodeSpec {
    Atomic,
    Compound {
        initial: Option<String>,
        states: Vec<StateNodeConfig>,
    },
    Parallel {
        states: Vec<StateNodeConfig>,
    },
    Final {
        data: Option<Value>,
    },
    History {
        kind: HistoryKind,
        target: Option<String>,
    },
}

/// One entry under a node's `on`/`always`/`after`, before target strings
/// have been resolved to [`NodeId`]s.
#[derive(Clone)]
pub struct TransitionConfig {
    pub targets: Vec<String>,
    pub guard: Option<GuardExpr>,
    pub in_state: Option<String>,
    pub actions: Vec<Action>,
    /// `None` lets the builder derive it per spec.md §3's default rule;
    /// `Some` forces the declared value.
    pub internal: Option<bool>,
}

impl TransitionConfig {
    pub fn new() -> Self {
        TransitionConfig { targets: Vec::new(), guard: None, in_state: None, actions: Vec::new(), internal: None }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    pub fn targets(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn guard(mut self, guard: GuardExpr) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn in_state(mut self, path: impl Into<String>) -> Self {
        self.in_state = Some(path.into());
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = Some(internal);
        self
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A node of the config tree a [`MachineBuilder`] is assembled from. Mirrors
/// [`StateNode`] but with child nodes owned inline and transition targets as
/// strings, the way a machine is naturally authored before ids exist.
pub struct StateNodeConfig {
    pub key: String,
    pub spec: NodeSpec,
    pub entry: Vec<Action>,
    pub exit: Vec<Action>,
    /// `(event_name, transition)`; an empty event name is the eventless/NULL
    /// pattern (XState's `always`), `"*"` is the wildcard.
    pub on: Vec<(String, TransitionConfig)>,
    pub after: Vec<(DelayRef, TransitionConfig)>,
    pub invocations: Vec<Invocation>,
    pub meta: Map<String, Value>,
}

impl StateNodeConfig {
    fn new(key: impl Into<String>, spec: NodeSpec) -> Self {
        StateNodeConfig {
            key: key.into(),
            spec,
            entry: Vec::new(),
            exit: Vec::new(),
            on: Vec::new(),
            after: Vec::new(),
            invocations: Vec::new(),
            meta: Map::new(),
        }
    }

    pub fn atomic(key: impl Into<String>) -> Self {
        Self::new(key, NodeSpec::Atomic)
    }

    pub fn compound(key: impl Into<String>, initial: impl Into<String>) -> Self {
        Self::new(key, NodeSpec::Compound { initial: Some(initial.into()), states: Vec::new() })
    }

    /// A compound node with no declared `initial`: a construction-time
    /// warning, falling back to being treated as a leaf (§7).
    pub fn compound_without_initial(key: impl Into<String>) -> Self {
        Self::new(key, NodeSpec::Compound { initial: None, states: Vec::new() })
    }

    pub fn parallel(key: impl Into<String>) -> Self {
        Self::new(key, NodeSpec::Parallel { states: Vec::new() })
    }

    pub fn final_state(key: impl Into<String>) -> Self {
        Self::new(key, NodeSpec::Final { data: None })
    }

    pub fn final_state_with_data(key: impl Into<String>, data: Value) -> Self {
        Self::new(key, NodeSpec::Final { data: Some(data) })
    }

    pub fn history(key: impl Into<String>, kind: HistoryKind, target: Option<String>) -> Self {
        Self::new(key, NodeSpec::History { kind, target })
    }

    pub fn child(mut self, child: StateNodeConfig) -> Self {
        match &mut self.spec {
            NodeSpec::Compound { states, .. } | NodeSpec::Parallel { states } => states.push(child),
            _ => panic!("only compound/parallel nodes accept children"),
        }
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = StateNodeConfig>) -> Self {
        for c in children {
            self = self.child(c);
        }
        self
    }

    pub fn entry(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.entry.extend(actions);
        self
    }

    pub fn exit(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.exit.extend(actions);
        self
    }

    /// Registers a transition for `event`. Pass `""` for the eventless/NULL
    /// pattern (a transient state) and `"*"` for the wildcard.
    pub fn on(mut self, event: impl Into<String>, transition: TransitionConfig) -> Self {
        self.on.push((event.into(), transition));
        self
    }

    /// Convenience for the eventless pattern (XState's `always`).
    pub fn always(mut self, transition: TransitionConfig) -> Self {
        self.on.push((String::new(), transition));
        self
    }

    pub fn after(mut self, delay: DelayRef, transition: TransitionConfig) -> Self {
        self.after.push((delay, transition));
        self
    }

    pub fn invoke(mut self, id: impl Into<String>) -> Self {
        self.invocations.push(Invocation { id: id.into() });
        self
    }

    pub fn meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }
}

/// Intermediate node while the arena is being assembled: everything
/// [`StateNode`] needs except the fields that require the whole tree to
/// exist first (resolved `initial`/targets/`in_state`, `history_target`).
struct PendingNode {
    key: String,
    path: Vec<String>,
    kind: NodeKind,
    order: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    initial_key: Option<String>,
    history_target_key: Option<String>,
    entry: Vec<Action>,
    exit: Vec<Action>,
    transitions: Vec<PendingTransition>,
    invocations: Vec<Invocation>,
    meta: Map<String, Value>,
    data: Option<Value>,
}

struct PendingTransition {
    event_pattern: EventPattern,
    guard: Option<GuardExpr>,
    in_state_path: Option<String>,
    target_paths: Vec<String>,
    actions: Vec<Action>,
    internal: Option<bool>,
}

/// Builds an immutable [`Definition`] (and the [`Machine`] wrapping it) from
/// a [`StateNodeConfig`] tree.
pub struct MachineBuilder {
    key: String,
    delimiter: String,
    strict: bool,
    root: StateNodeConfig,
}

impl MachineBuilder {
    pub fn new(key: impl Into<String>, root: StateNodeConfig) -> Self {
        MachineBuilder { key: key.into(), delimiter: ".".to_string(), strict: false, root }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self, options: MachineOptions, default_context: Context) -> Result<Machine, GearboxError> {
        let definition = self.build_definition()?;
        for w in &definition.warnings {
            tracing::warn!(target: "gearbox", machine = %definition.key, "{w}");
        }
        Ok(Machine { definition: Arc::new(definition), options, default_context })
    }

    fn build_definition(self) -> Result<Definition, GearboxError> {
        let mut pending: Vec<PendingNode> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        let root_id = lower(&self.root, None, Vec::new(), &mut 0, &mut pending, &mut warnings);

        let mut nodes_by_path: HashMap<Vec<String>, NodeId> = HashMap::new();
        let mut nodes_by_key: HashMap<String, Vec<NodeId>> = HashMap::new();
        for (i, n) in pending.iter().enumerate() {
            let id = NodeId(i as u32);
            nodes_by_path.insert(n.path.clone(), id);
            nodes_by_key.entry(n.key.clone()).or_default().push(id);
        }

        // Resolve `initial` keys (direct children only) and validate.
        let mut initial_resolved: Vec<Option<NodeId>> = vec![None; pending.len()];
        for i in 0..pending.len() {
            if let Some(initial_key) = pending[i].initial_key.clone() {
                let found = pending[i]
                    .children
                    .iter()
                    .copied()
                    .find(|&c| pending[c.index()].key == initial_key);
                match found {
                    Some(child) => initial_resolved[i] = Some(child),
                    None => {
                        return Err(GearboxError::InvalidInitial(format!(
                            "{}: declared initial '{}' is not a child",
                            pending[i].key, initial_key
                        )));
                    }
                }
            } else if matches!(pending[i].kind, NodeKind::Compound) && !pending[i].children.is_empty() {
                warnings.push(format!(
                    "compound state '{}' has no `initial`; falling back to itself",
                    pending[i].key
                ));
            }
        }

        // Resolve history `target` keys the same way targets are resolved below.
        let mut history_target_resolved: HashMap<NodeId, NodeId> = HashMap::new();
        for i in 0..pending.len() {
            let id = NodeId(i as u32);
            if let Some(target_key) = pending[i].history_target_key.clone() {
                let resolved = resolve_target(&pending, &nodes_by_path, &nodes_by_key, id, &target_key, &self.delimiter)?;
                history_target_resolved.insert(id, resolved);
            }
        }

        // Resolve transition targets / in_state paths.
        let mut resolved_transitions: Vec<Vec<TransitionDef>> = Vec::with_capacity(pending.len());
        for i in 0..pending.len() {
            let source = NodeId(i as u32);
            let mut defs = Vec::with_capacity(pending[i].transitions.len());
            for t in &pending[i].transitions {
                let mut targets = Vec::with_capacity(t.target_paths.len());
                for p in &t.target_paths {
                    targets.push(resolve_target(&pending, &nodes_by_path, &nodes_by_key, source, p, &self.delimiter)?);
                }
                let in_state = match &t.in_state_path {
                    Some(p) => Some(resolve_target(&pending, &nodes_by_path, &nodes_by_key, source, p, &self.delimiter)?),
                    None => None,
                };
                let internal = t.internal.unwrap_or_else(|| {
                    default_internal(&pending, source, &targets)
                });
                defs.push(TransitionDef {
                    event_pattern: t.event_pattern.clone(),
                    guard: t.guard.clone(),
                    in_state,
                    targets,
                    actions: t.actions.clone(),
                    internal,
                });
            }
            resolved_transitions.push(defs);
        }

        let mut declared_events: std::collections::HashSet<String> = std::collections::HashSet::new();
        for defs in &resolved_transitions {
            for t in defs {
                if let EventPattern::Named(n) = &t.event_pattern {
                    declared_events.insert(n.clone());
                }
            }
        }

        // An unconditional (unguarded, no `in_state`) transition shadows every
        // later transition on the same node for the same event pattern (§7
        // warning: "unreachable guarded transitions (unguarded transition not
        // last)"), since the Selector (§4.2) takes the first match per region.
        for (i, defs) in resolved_transitions.iter().enumerate() {
            let mut unconditional_seen: Vec<&EventPattern> = Vec::new();
            for t in defs {
                if unconditional_seen.iter().any(|p| *p == &t.event_pattern) {
                    warnings.push(format!(
                        "'{}': a later transition on {:?} is unreachable, shadowed by an earlier unconditional one",
                        pending[i].key, t.event_pattern
                    ));
                } else if t.guard.is_none() && t.in_state.is_none() {
                    unconditional_seen.push(&t.event_pattern);
                }
            }
        }

        let mut history_children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (i, n) in pending.iter().enumerate() {
            if let NodeKind::History(_) = n.kind {
                if let Some(parent) = n.parent {
                    history_children.entry(parent).or_default().push(NodeId(i as u32));
                }
            }
        }

        let nodes: Vec<StateNode> = pending
            .into_iter()
            .enumerate()
            .map(|(i, n)| StateNode {
                id: NodeId(i as u32),
                key: n.key,
                path: n.path,
                kind: n.kind,
                order: n.order,
                parent: n.parent,
                children: n.children,
                initial: initial_resolved[i],
                history_target: history_target_resolved.get(&NodeId(i as u32)).copied(),
                entry: n.entry,
                exit: n.exit,
                transitions: std::mem::take(&mut resolved_transitions[i]),
                invocations: n.invocations,
                meta: n.meta,
                data: n.data,
            })
            .collect();

        Ok(Definition {
            key: self.key,
            nodes,
            root: root_id,
            delimiter: self.delimiter,
            strict: self.strict,
            history_children,
            warnings,
            declared_events,
        })
    }
}

fn default_internal(pending: &[PendingNode], source: NodeId, targets: &[NodeId]) -> bool {
    if targets.is_empty() {
        return true;
    }
    matches!(pending[source.index()].kind, NodeKind::Compound)
        && targets.iter().all(|&t| is_pending_descendant(pending, t, source))
}

fn is_pending_descendant(pending: &[PendingNode], node: NodeId, ancestor: NodeId) -> bool {
    let mut cur = pending[node.index()].parent;
    while let Some(p) = cur {
        if p == ancestor {
            return true;
        }
        cur = pending[p.index()].parent;
    }
    false
}

fn resolve_target(
    pending: &[PendingNode],
    nodes_by_path: &HashMap<Vec<String>, NodeId>,
    nodes_by_key: &HashMap<String, Vec<NodeId>>,
    source: NodeId,
    target: &str,
    delimiter: &str,
) -> Result<NodeId, GearboxError> {
    let target = target.strip_prefix('#').unwrap_or(target);

    // 1. Absolute path from the machine root.
    let segments: Vec<String> = target.split(delimiter).map(str::to_string).collect();
    if let Some(&id) = nodes_by_path.get(&segments) {
        return Ok(id);
    }

    // 2. Relative to the transition source's own parent (sibling lookup),
    //    the common case for `target: "sibling_key"`.
    if let Some(parent) = pending[source.index()].parent {
        let mut candidate = pending[parent.index()].path.clone();
        candidate.extend(segments.iter().cloned());
        if let Some(&id) = nodes_by_path.get(&candidate) {
            return Ok(id);
        }
    }

    // 3. Relative to the source itself (targeting one of its own descendants).
    let mut candidate = pending[source.index()].path.clone();
    candidate.extend(segments.iter().cloned());
    if let Some(&id) = nodes_by_path.get(&candidate) {
        return Ok(id);
    }

    // 4. Fall back to a unique key lookup across the whole tree.
    match nodes_by_key.get(target) {
        Some(ids) if ids.len() == 1 => Ok(ids[0]),
        _ => Err(GearboxError::InvalidTarget(target.to_string())),
    }
}

fn lower(
    config: &StateNodeConfig,
    parent: Option<NodeId>,
    parent_path: Vec<String>,
    counter: &mut u32,
    pending: &mut Vec<PendingNode>,
    warnings: &mut Vec<String>,
) -> NodeId {
    let id = NodeId(*counter);
    *counter += 1;
    let order = id.0;

    let mut path = parent_path;
    path.push(config.key.clone());

    let (kind, child_configs, initial_key, data) = match &config.spec {
        NodeSpec::Atomic => (NodeKind::Atomic, &[][..], None, None),
        NodeSpec::Compound { initial, states } => (NodeKind::Compound, states.as_slice(), initial.clone(), None),
        NodeSpec::Parallel { states } => (NodeKind::Parallel, states.as_slice(), None, None),
        NodeSpec::Final { data } => (NodeKind::Final, &[][..], None, data.clone()),
        NodeSpec::History { .. } => (NodeKind::Atomic, &[][..], None, None), // overwritten below
    };

    let history_target_key = match &config.spec {
        NodeSpec::History { target, .. } => target.clone(),
        _ => None,
    };
    let kind = match &config.spec {
        NodeSpec::History { kind, .. } => NodeKind::History(*kind),
        _ => kind,
    };

    let (after_transitions, after_entry, after_exit) = if config.after.is_empty() {
        (Vec::new(), Vec::new(), Vec::new())
    } else {
        let entries = config
            .after
            .iter()
            .map(|(delay, t)| AfterTransitionConfig {
                delay: delay.clone(),
                transition: TransitionDef {
                    event_pattern: EventPattern::Null, // placeholder, overwritten by desugar_after
                    guard: t.guard.clone(),
                    in_state: None,
                    targets: vec![], // resolved via PendingTransition below instead
                    actions: t.actions.clone(),
                    internal: t.internal.unwrap_or(false),
                },
            })
            .collect();
        desugar_after(&config.key, entries)
    };

    let mut transitions: Vec<PendingTransition> = Vec::with_capacity(config.on.len() + config.after.len());
    for (event, t) in &config.on {
        let event_pattern = match event.as_str() {
            "" => EventPattern::Null,
            "*" => EventPattern::Wildcard,
            name => EventPattern::Named(name.to_string()),
        };
        transitions.push(PendingTransition {
            event_pattern,
            guard: t.guard.clone(),
            in_state_path: t.in_state.clone(),
            target_paths: t.targets.clone(),
            actions: t.actions.clone(),
            internal: t.internal,
        });
    }
    // `after` transitions carry their own synthesized event name and target
    // paths straight from the user's config (desugar_after only rewrote the
    // pattern/send/cancel shape, not the targets).
    for (i, (_, t)) in config.after.iter().enumerate() {
        let synthesized = &after_transitions[i];
        transitions.push(PendingTransition {
            event_pattern: synthesized.event_pattern.clone(),
            guard: t.guard.clone(),
            in_state_path: t.in_state.clone(),
            target_paths: t.targets.clone(),
            actions: t.actions.clone(),
            internal: t.internal,
        });
    }

    let mut entry = config.entry.clone();
    entry.extend(after_entry);
    let mut exit = config.exit.clone();
    exit.extend(after_exit);

    pending.push(PendingNode {
        key: config.key.clone(),
        path: path.clone(),
        kind,
        order,
        parent,
        children: Vec::new(),
        initial_key,
        history_target_key,
        entry,
        exit,
        transitions,
        invocations: config.invocations.clone(),
        meta: config.meta.clone(),
        data,
    });

    let mut children = Vec::with_capacity(child_configs.len());
    for child_config in child_configs {
        let child_id = lower(child_config, Some(id), path.clone(), counter, pending, warnings);
        children.push(child_id);
    }
    pending[id.index()].children = children;

    id
}

/// A normalized, serializable view of a subtree, for `StateNode.definition()`
/// (§6). Carries only data, never the closures behind `Assign`/`Pure`/`Named`
/// actions or `GuardExpr::Predicate`/`Named` guards.
#[derive(Debug, Serialize)]
pub struct DefinitionDocument {
    pub id: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub initial: Option<String>,
    pub states: Vec<DefinitionDocument>,
    pub on: Vec<EventDocument>,
}

#[derive(Debug, Serialize)]
pub struct EventDocument {
    pub event: String,
    pub targets: Vec<String>,
    pub internal: bool,
}

pub fn definition_document(def: &Definition, node: NodeId) -> DefinitionDocument {
    let n = def.node(node);
    let kind = match n.kind {
        NodeKind::Atomic => "atomic",
        NodeKind::Compound => "compound",
        NodeKind::Parallel => "parallel",
        NodeKind::History(HistoryKind::Shallow) => "history.shallow",
        NodeKind::History(HistoryKind::Deep) => "history.deep",
        NodeKind::Final => "final",
    };
    DefinitionDocument {
        id: n.path.join(&def.delimiter),
        key: n.key.clone(),
        kind,
        initial: n.initial.map(|i| def.node(i).key.clone()),
        states: n.children.iter().map(|&c| definition_document(def, c)).collect(),
        on: n
            .transitions
            .iter()
            .map(|t| EventDocument {
                event: match &t.event_pattern {
                    EventPattern::Null => String::new(),
                    EventPattern::Wildcard => "*".to_string(),
                    EventPattern::Named(n) => n.clone(),
                },
                targets: t.targets.iter().map(|&id| def.node(id).key.clone()).collect(),
                internal: t.internal,
            })
            .collect(),
    }
}

/// A constructed, shareable statechart. Cheap to clone: the arena is behind
/// an `Arc` (§5's "definitions are immutable and freely shareable").
#[derive(Clone)]
pub struct Machine {
    pub definition: Arc<Definition>,
    pub options: MachineOptions,
    pub default_context: Context,
}

impl Machine {
    /// Computes the entry set from the root down through every `initial`
    /// chain, runs entry actions, and returns the resulting `State` (§6
    /// `Machine.initial_state`). The observable `event` is `xstate.init`.
    pub fn initial_state(&self, context: Option<Context>) -> Result<State, GearboxError> {
        let context = context.unwrap_or_else(|| self.default_context.clone());
        crate::step::initial(self, context)
    }

    /// Runs one macrostep to quiescence (§4.4). `context`, if given,
    /// overrides `state.context` before the macrostep runs.
    pub fn transition(
        &self,
        state: &State,
        event: impl Into<EventInput>,
        context: Option<Context>,
    ) -> Result<State, GearboxError> {
        let event = event.into();
        if self.definition.strict {
            let data = match &event {
                EventInput::Name(n) => n.clone(),
                EventInput::WithPayload { name, .. } => name.clone(),
            };
            if !self.definition.declared_events.contains(&data) && !is_builtin_event(&data) {
                return Err(GearboxError::UnknownEvent(data));
            }
        }
        let mut state = state.clone();
        if let Some(c) = context {
            state.context = c;
        }
        crate::step::transition(self, &state, event)
    }

    pub fn get_state_node_by_id(&self, id: &str) -> Option<&StateNode> {
        let delimiter = self.definition.delimiter.as_str();
        self.definition
            .node_by_id_str(id)
            .or_else(|| self.definition.node_by_path(&id.split(delimiter).map(str::to_string).collect::<Vec<_>>()))
            .map(|id| self.definition.node(id))
    }

    pub fn with_options(&self, options: MachineOptions) -> Machine {
        Machine { definition: self.definition.clone(), options, default_context: self.default_context.clone() }
    }

    pub fn with_context(&self, context: Context) -> Machine {
        Machine { definition: self.definition.clone(), options: self.options.clone(), default_context: context }
    }

    pub fn definition_document(&self) -> DefinitionDocument {
        definition_document(&self.definition, self.definition.root)
    }
}

fn is_builtin_event(name: &str) -> bool {
    let done_state_prefix = done_state_event_name("");
    let done_invoke_prefix = done_invoke_event_name("");
    let error_platform_prefix = error_platform_event_name("");
    name == INIT_EVENT
        || name.starts_with("xstate.after(")
        || name.starts_with(&done_state_prefix)
        || name.starts_with(&done_invoke_prefix)
        || name.starts_with(&error_platform_prefix)
}
