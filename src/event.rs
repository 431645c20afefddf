//! Event and context plumbing (§3, §6).

use serde::Serialize;
use serde_json::Value;

/// Extended-state data. A free-form JSON value, as in XState; `Machine`
/// carries no schema for it beyond what guards/actions choose to read.
pub type Context = Value;

/// One event crossing the machine boundary, or raised/sent internally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    pub name: String,
    pub data: Value,
}

impl EventData {
    /// The null/eventless "event" used to drive transient transitions.
    /// Represented as an empty name, which no real event is ever given.
    pub fn null() -> Self {
        EventData {
            name: String::new(),
            data: Value::Null,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        EventData {
            name: name.into(),
            data: Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }
}

/// Anything that can be sent to [`crate::machine::Machine::transition`]:
/// a bare event name, or a name with a JSON payload.
#[derive(Debug, Clone)]
pub enum EventInput {
    Name(String),
    WithPayload { name: String, data: Value },
}

impl EventInput {
    pub fn into_event_data(self) -> EventData {
        match self {
            EventInput::Name(name) => EventData { name, data: Value::Null },
            EventInput::WithPayload { name, data } => EventData { name, data },
        }
    }
}

impl From<&str> for EventInput {
    fn from(s: &str) -> Self {
        EventInput::Name(s.to_string())
    }
}

impl From<String> for EventInput {
    fn from(s: String) -> Self {
        EventInput::Name(s)
    }
}

impl From<(&str, Value)> for EventInput {
    fn from((name, data): (&str, Value)) -> Self {
        EventInput::WithPayload { name: name.to_string(), data }
    }
}

impl From<(String, Value)> for EventInput {
    fn from((name, data): (String, Value)) -> Self {
        EventInput::WithPayload { name, data }
    }
}

impl From<EventData> for EventInput {
    fn from(e: EventData) -> Self {
        EventInput::WithPayload { name: e.name, data: e.data }
    }
}

/// Matches nothing a real sender would ever name; reserved for `EventPattern::Wildcard`.
pub const WILDCARD: &str = "*";

pub const INIT_EVENT: &str = "xstate.init";

pub fn after_event_name(delay_key: &str, node_key: &str) -> String {
    format!("xstate.after({delay_key})#{node_key}")
}

pub fn done_state_event_name(node_key: &str) -> String {
    format!("done.state.{node_key}")
}

pub fn done_invoke_event_name(id: &str) -> String {
    format!("done.invoke.{id}")
}

pub fn error_platform_event_name(id: &str) -> String {
    format!("error.platform.{id}")
}
