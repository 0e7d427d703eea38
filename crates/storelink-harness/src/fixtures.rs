#![forbid(unsafe_code)]

//! Shared store and mappings for end-to-end scenarios.

use std::rc::Rc;

use storelink::prelude::*;

use crate::call_log::CallLog;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterState {
    pub count: i64,
    /// Bumped by [`CounterAction::Touch`]; never read by the counter mappings.
    pub touches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    Increment,
    Add(i64),
    /// Changes the state without changing `count`.
    Touch,
    /// Returns the same state allocation.
    Noop,
}

pub type CounterStore = BasicStore<CounterState, CounterAction>;

fn reduce(state: &Rc<CounterState>, action: CounterAction) -> Rc<CounterState> {
    match action {
        CounterAction::Increment => Rc::new(CounterState {
            count: state.count + 1,
            ..(**state).clone()
        }),
        CounterAction::Add(n) => Rc::new(CounterState {
            count: state.count + n,
            ..(**state).clone()
        }),
        CounterAction::Touch => Rc::new(CounterState {
            touches: state.touches + 1,
            ..(**state).clone()
        }),
        CounterAction::Noop => Rc::clone(state),
    }
}

#[must_use]
pub fn counter_store() -> Rc<CounterStore> {
    Rc::new(BasicStore::new(CounterState::default(), reduce))
}

/// `{count}`, recording `<name>:select` on every call.
#[must_use]
pub fn logged_count(name: &str, log: &CallLog) -> StateMapping<CounterState, CounterAction> {
    let name = name.to_owned();
    let log = log.clone();
    StateMapping::new(move |state: &CounterState| {
        log.record(&name, "select");
        Props::new().with("count", state.count)
    })
}

/// Connector for a logged `{count}` consumer.
///
/// # Errors
///
/// Propagates the [`ConfigError`] from `build`.
pub fn count_connector(
    name: &str,
    log: &CallLog,
) -> Result<Connector<CounterState, CounterAction>, ConfigError> {
    connect(name).map_state(logged_count(name, log)).build()
}
