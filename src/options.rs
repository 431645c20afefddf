//! The late-bound actions/guards/delays/services table (§9), keyed by
//! name so a single immutable [`crate::node::Definition`] can be reused
//! with different implementations.

use std::collections::{HashMap, HashSet};

use crate::guards::GuardFn;
use crate::node::PureFn;

/// Derived by `gearbox_macros::Named` for zero-sized marker types, so
/// callers can register options by type instead of hand-writing string
/// keys: `options.guard::<IsAdult>(...)` instead of `options.guard("is_adult", ...)`.
pub trait Named {
    fn name() -> &'static str;
}

#[derive(Clone, Default)]
pub struct MachineOptions {
    pub actions: HashMap<String, PureFn>,
    pub guards: HashMap<String, GuardFn>,
    /// Named delay -> milliseconds, resolved when a `Send`/`after` action
    /// referencing `DelayRef::Named` is actually emitted.
    pub delays: HashMap<String, u64>,
    /// Known invocation `src` identifiers; validated when an `Invoke`
    /// action is resolved. Empty means "accept anything" (no registry
    /// configured), matching the teacher's permissive defaults.
    pub services: HashSet<String>,
}

impl MachineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, name: impl Into<String>, f: PureFn) -> Self {
        self.actions.insert(name.into(), f);
        self
    }

    pub fn action_for<T: Named>(self, f: PureFn) -> Self {
        self.action(T::name(), f)
    }

    pub fn guard(mut self, name: impl Into<String>, f: GuardFn) -> Self {
        self.guards.insert(name.into(), f);
        self
    }

    pub fn guard_for<T: Named>(self, f: GuardFn) -> Self {
        self.guard(T::name(), f)
    }

    pub fn delay(mut self, name: impl Into<String>, millis: u64) -> Self {
        self.delays.insert(name.into(), millis);
        self
    }

    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.services.insert(name.into());
        self
    }
}
