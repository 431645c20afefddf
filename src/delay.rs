//! Desugaring for `after` (delayed) transitions (§4.6).
//!
//! An `after: { 1000: { target: ... } }` entry on a node is rewritten at
//! build time into: (a) an ordinary transition on that node listening for
//! `xstate.after(1000)#<node>`, and (b) a `Send` action carrying that same
//! event name and delay, attached to the node's `entry` list so the event
//! is scheduled the moment the node is entered. A matching `Cancel`
//! action is attached to the node's `exit` list so leaving the node before
//! the delay elapses prevents a stale firing — the timer itself is an
//! external-loop concern (§1); this crate only emits the `Send`/`Cancel`
//! action shapes for that loop to honor.

use crate::event::after_event_name;
use crate::node::{Action, DelayRef, EventPattern, TransitionDef};

pub struct AfterTransitionConfig {
    pub delay: DelayRef,
    pub transition: TransitionDef,
}

/// Desugars one node's `after` entries into `(extra transitions, entry
/// actions, exit actions)` to splice onto that node.
pub fn desugar_after(
    node_key: &str,
    entries: Vec<AfterTransitionConfig>,
) -> (Vec<TransitionDef>, Vec<Action>, Vec<Action>) {
    let mut transitions = Vec::with_capacity(entries.len());
    let mut entry = Vec::with_capacity(entries.len());
    let mut exit = Vec::with_capacity(entries.len());

    for (i, cfg) in entries.into_iter().enumerate() {
        let delay_key = match &cfg.delay {
            DelayRef::Millis(ms) => ms.to_string(),
            DelayRef::Named(name) => name.clone(),
        };
        let event_name = after_event_name(&delay_key, node_key);
        let send_id = format!("{node_key}#after#{i}");

        let mut transition = cfg.transition;
        transition.event_pattern = EventPattern::Named(event_name.clone());
        transitions.push(transition);

        entry.push(Action::Send {
            event: event_name.clone(),
            delay: Some(cfg.delay),
            id: Some(send_id.clone()),
        });
        exit.push(Action::Cancel { send_id });
    }

    (transitions, entry, exit)
}
