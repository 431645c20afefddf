//! The observable `State` snapshot returned by `Machine::transition` (§3, §6).

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::configuration::{is_in_final_state, Configuration};
use crate::event::EventData;
use crate::history::HistoryMap;
use crate::node::{Action, DelayRef, Definition, TransitionDef};
use crate::state_value::{configuration_to_state_value, to_strings, value_matches, StateValue};

/// A point-in-time snapshot of a machine: immutable, cheaply clonable,
/// and the sole channel through which a caller observes configuration,
/// context, and what just happened (§6).
#[derive(Debug, Clone)]
pub struct State {
    pub value: StateValue,
    pub context: Value,
    /// The external event that produced this state (the wrapped original
    /// event of the macrostep, not any internally-raised event).
    pub event: EventData,
    pub history_value: HistoryMap,
    /// The prior `State`, with its own `history_value` cleared to bound
    /// memory growth across a long-running session (§4.4).
    pub prev_state: Option<Box<State>>,
    /// Observable actions emitted by the macrostep that produced this
    /// state, in exit -> transition -> entry order, already stripped of
    /// `Assign`/`Raise`/internal `Send` (§4.3).
    pub actions: Vec<Action>,
    /// Every transition actually taken during the macrostep, across all
    /// of its microsteps, in the order they fired.
    pub transitions: Vec<TransitionDef>,
    /// Merged `meta` of every node in `configuration`, keyed by node key.
    pub meta: BTreeMap<String, Value>,
    pub configuration: Configuration,
    /// Whether this macrostep produced a new observable state: any
    /// configuration/context change or emitted action (§4.4, §8).
    pub changed: bool,
}

impl State {
    /// `true` if `partial` is satisfied by this state's value (§3 `State.matches`).
    pub fn matches(&self, partial: &StateValue) -> bool {
        value_matches(&self.value, partial)
    }

    /// Every dotted path from root to an active leaf.
    pub fn to_strings(&self, delimiter: &str) -> Vec<String> {
        to_strings(&self.value, delimiter)
    }

    /// Dry-runs the Transition Selector for `event_name` without mutating
    /// anything: `true` if at least one transition would fire.
    pub fn can(&self, def: &Definition, options: &crate::options::MachineOptions, event_name: &str) -> bool {
        let event = EventData::named(event_name);
        crate::selector::select_transitions(def, &self.configuration, &event, &self.context, options)
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    /// Event names some transition reachable from the current
    /// configuration would respond to (§6).
    pub fn next_events(&self, def: &Definition) -> Vec<String> {
        crate::selector::next_events(def, &self.configuration)
    }

    /// `true` when the root machine is in a final configuration: every
    /// top-level region (or the sole top-level branch) has reached a
    /// `final` leaf.
    pub fn done(&self, def: &Definition) -> bool {
        is_in_final_state(def, &self.configuration, def.root)
    }
}

pub(crate) fn collect_meta(def: &Definition, cfg: &Configuration) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for &id in cfg {
        let node = def.node(id);
        if node.meta.is_empty() {
            continue;
        }
        out.insert(node.key.clone(), Value::Object(node.meta.clone()));
    }
    out
}

/// A serializable projection of an emitted [`Action`] (§6's persisted-state
/// `actions` field). `Assign`/`Pure`/`Named` never survive to `State.actions`
/// (the Action Resolver folds or expands them away, §4.3 step 6-8) since
/// they carry closures that cannot round-trip through JSON; they fall back
/// to `kind`-only if one somehow did.
#[derive(Serialize)]
#[serde(tag = "type")]
enum ActionSummary {
    Send { event: String, delay: Option<Value>, id: Option<String> },
    Log { label: Option<String> },
    Start { activity: String },
    Stop { activity: String },
    Invoke { id: String, src: String },
    Cancel { send_id: String },
    Custom { kind: String },
}

impl From<&Action> for ActionSummary {
    fn from(action: &Action) -> Self {
        match action {
            Action::Send { event, delay, id } => ActionSummary::Send {
                event: event.clone(),
                delay: delay.as_ref().map(|d| match d {
                    DelayRef::Millis(ms) => Value::from(*ms),
                    DelayRef::Named(name) => Value::String(name.clone()),
                }),
                id: id.clone(),
            },
            Action::Log { label } => ActionSummary::Log { label: label.clone() },
            Action::Start(activity) => ActionSummary::Start { activity: activity.clone() },
            Action::Stop(activity) => ActionSummary::Stop { activity: activity.clone() },
            Action::Invoke { id, src } => ActionSummary::Invoke { id: id.clone(), src: src.clone() },
            Action::Cancel { send_id } => ActionSummary::Cancel { send_id: send_id.clone() },
            Action::Custom { kind } => ActionSummary::Custom { kind: kind.clone() },
            Action::Assign(_) => ActionSummary::Custom { kind: "assign".to_string() },
            Action::Pure(_) => ActionSummary::Custom { kind: "pure".to_string() },
            Action::Named(name) => ActionSummary::Custom { kind: name.clone() },
        }
    }
}

/// Persisted-state representation (§6): `value`, `context`, `history_value`,
/// `actions`, `meta` and `_event`, omitting `configuration` and
/// `transitions` (both recomputable from `value`/the definition) as well as
/// `prev_state` (this is the snapshot, not the chain). `activities` and
/// `children` are likewise omitted: this crate models activities/services
/// only as opaque `Start`/`Stop`/`Invoke` action shapes (§1's "external
/// collaborators" boundary), never as a live runtime table to persist.
#[derive(Serialize)]
struct PersistedState<'a> {
    value: &'a StateValue,
    context: &'a Value,
    history_value: &'a HistoryMap,
    actions: Vec<ActionSummary>,
    meta: &'a BTreeMap<String, Value>,
    #[serde(rename = "_event")]
    event: &'a EventData,
}

impl Serialize for State {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        PersistedState {
            value: &self.value,
            context: &self.context,
            history_value: &self.history_value,
            actions: self.actions.iter().map(ActionSummary::from).collect(),
            meta: &self.meta,
            event: &self.event,
        }
        .serialize(serializer)
    }
}
