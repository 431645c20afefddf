//! The error taxonomy (§7). Definition-time errors abort
//! `MachineBuilder::build`; runtime errors are returned from
//! `Machine::transition` and leave the caller's prior `State` untouched.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GearboxError {
    #[error("unknown state reference: {0}")]
    UnknownState(String),

    #[error("unknown event pattern: {0}")]
    UnknownEvent(String),

    #[error("compound state '{0}' has no initial child and no children to fall back to")]
    InvalidInitial(String),

    #[error("guard '{guard}' failed while evaluating event '{event}' on node {source_id}: {reason}")]
    GuardFailed {
        guard: String,
        event: String,
        source_id: u32,
        reason: String,
    },

    #[error("transition references delay '{0}', which is not registered in MachineOptions::delays")]
    UnresolvedDelay(String),

    #[error("transition references unknown action '{0}' (not registered in MachineOptions::actions)")]
    UnknownActionRef(String),

    #[error("transition references unknown guard '{name}' (not registered in MachineOptions::guards)")]
    UnknownGuardRef { name: String },

    #[error("invoke references unknown service '{0}' (not registered in MachineOptions::services)")]
    UnknownServiceRef(String),

    #[error("transition target '{0}' does not resolve to any node in the definition")]
    InvalidTarget(String),
}
