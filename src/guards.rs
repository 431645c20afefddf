//! Guard expressions: the predicate language transitions are filtered by
//! (§3, §4.2).

use std::sync::Arc;

use serde_json::Value;

use crate::error::GearboxError;
use crate::event::{Context, EventData};
use crate::node::NodeId;
use crate::options::MachineOptions;
use crate::state_value::StateValue;

/// Context passed to a guard alongside `(context, event)`: the bits of
/// machine state a guard is allowed to read but never mutate.
pub struct GuardMeta<'a> {
    pub state_value: &'a StateValue,
    pub source: NodeId,
}

pub type GuardFn =
    Arc<dyn Fn(&Context, &EventData, &GuardMeta) -> Result<bool, String> + Send + Sync>;

#[derive(Clone)]
pub enum GuardExpr {
    /// A closure baked directly into the `Definition`, for callers building
    /// machines programmatically rather than through named options.
    Predicate(GuardFn),
    /// Resolved against `MachineOptions::guards` at evaluation time, so the
    /// same `Definition` can be paired with different guard implementations
    /// via `Machine::with_options` (§9).
    Named { name: String, params: Value },
    And(Vec<GuardExpr>),
    Or(Vec<GuardExpr>),
    Not(Box<GuardExpr>),
}

impl std::fmt::Debug for GuardExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardExpr::Predicate(_) => f.write_str("Predicate(..)"),
            GuardExpr::Named { name, params } => {
                f.debug_struct("Named").field("name", name).field("params", params).finish()
            }
            GuardExpr::And(gs) => f.debug_tuple("And").field(gs).finish(),
            GuardExpr::Or(gs) => f.debug_tuple("Or").field(gs).finish(),
            GuardExpr::Not(g) => f.debug_tuple("Not").field(g).finish(),
        }
    }
}

pub fn and(guards: impl IntoIterator<Item = GuardExpr>) -> GuardExpr {
    GuardExpr::And(guards.into_iter().collect())
}

pub fn or(guards: impl IntoIterator<Item = GuardExpr>) -> GuardExpr {
    GuardExpr::Or(guards.into_iter().collect())
}

pub fn not(guard: GuardExpr) -> GuardExpr {
    GuardExpr::Not(Box::new(guard))
}

pub fn eval_guard(
    guard: &GuardExpr,
    context: &Context,
    event: &EventData,
    meta: &GuardMeta,
    options: &MachineOptions,
) -> Result<bool, GearboxError> {
    match guard {
        GuardExpr::Predicate(f) => f(context, event, meta).map_err(|source| GearboxError::GuardFailed {
            guard: "<predicate>".to_string(),
            event: event.name.clone(),
            source_id: meta.source.0,
            reason: source,
        }),
        GuardExpr::Named { name, params: _ } => match options.guards.get(name.as_str()) {
            Some(f) => f(context, event, meta).map_err(|source| GearboxError::GuardFailed {
                guard: name.clone(),
                event: event.name.clone(),
                source_id: meta.source.0,
                reason: source,
            }),
            None => Err(GearboxError::UnknownGuardRef { name: name.clone() }),
        },
        GuardExpr::And(gs) => {
            for g in gs {
                if !eval_guard(g, context, event, meta, options)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        GuardExpr::Or(gs) => {
            for g in gs {
                if eval_guard(g, context, event, meta, options)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        GuardExpr::Not(g) => Ok(!eval_guard(g, context, event, meta, options)?),
    }
}
