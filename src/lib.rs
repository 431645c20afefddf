//! `gearbox`: a hierarchical statechart interpreter in the Harel/SCXML
//! family — nested (XOR) states, orthogonal (AND) regions, history states,
//! guarded transitions, internal/external transition semantics, delayed
//! transitions, raised events processed to run-to-completion, and extended
//! state threaded through pure assignment actions.
//!
//! The crate is organized the way the specification it implements is:
//! an immutable [`node::Definition`] (the state tree), a
//! [`configuration::Configuration`] algebra over sets of active nodes, a
//! [`selector`] that picks enabled transitions, a [`resolver`] that turns a
//! selection into an ordered action list and a folded context, and a
//! [`step`] engine that composes those into the public
//! [`machine::Machine::transition`] entry point. [`machine::MachineBuilder`]
//! lowers a hand-authored [`machine::StateNodeConfig`] tree into the arena
//! the rest of the crate runs on.

pub mod configuration;
pub mod delay;
pub mod error;
pub mod event;
pub mod guards;
pub mod history;
pub mod machine;
pub mod node;
pub mod options;
pub mod resolver;
pub mod selector;
pub mod state;
pub mod state_value;
pub mod step;

pub use error::GearboxError;
pub use event::{Context, EventData, EventInput};
pub use guards::GuardExpr;
pub use machine::{Machine, MachineBuilder, StateNodeConfig, TransitionConfig};
pub use node::{Action, HistoryKind, NodeId};
pub use options::{MachineOptions, Named};
pub use state::State;
pub use state_value::StateValue;

// `Named` the trait (type namespace) and `Named` the derive macro (macro
// namespace) share a name without conflict, the way `serde::Serialize`
// coexists with its derive.
pub use gearbox_macros::Named;
