//! E2E: the counter scenario.
//!
//! One consumer shows `{count}` and exposes an `increment` handler. Calling
//! the handler must cause exactly one re-run with `{count: 1}`; a dispatch
//! that leaves the state allocation untouched must cause none.

use std::rc::Rc;

use storelink::prelude::*;
use storelink_harness::fixtures::{CounterAction, CounterState, counter_store};
use storelink_harness::{CallLog, RerunMode, TestConsumer};

fn counter() -> Connector<CounterState, CounterAction> {
    connect("Counter")
        .map_state(StateMapping::new(|state: &CounterState| {
            Props::new().with("count", state.count)
        }))
        .map_dispatch(
            Props::new().with("increment", ActionCreator::new(|_| CounterAction::Increment)),
        )
        .build()
        .expect("valid connector")
}

fn mounted() -> (
    Rc<BasicStore<CounterState, CounterAction>>,
    Provider<CounterState, CounterAction>,
    Rc<TestConsumer<CounterState, CounterAction>>,
) {
    let store = counter_store();
    let provider = Provider::new(store.clone());
    provider.mount();
    let log = CallLog::new();
    let consumer = TestConsumer::mount(
        &counter(),
        provider.context(),
        Props::new(),
        RerunMode::Immediate,
        &log,
    );
    (store, provider, consumer)
}

#[test]
fn e2e_increment_causes_one_rerun() {
    let (store, _provider, consumer) = mounted();
    let first = consumer.last_output().unwrap();
    assert_eq!(first.get_int("count"), Some(0));

    first.action("increment").unwrap().call(&[]);

    assert_eq!(consumer.requests(), 1);
    assert_eq!(consumer.renders(), 2);
    let output = consumer.last_output().unwrap();
    assert_eq!(output.get_int("count"), Some(1));
    assert_eq!(store.state().count, 1);
}

#[test]
fn e2e_noop_dispatch_causes_no_rerun() {
    let (store, _provider, consumer) = mounted();
    store.dispatch(CounterAction::Increment);
    let requests = consumer.requests();

    store.dispatch(CounterAction::Noop);
    assert_eq!(consumer.requests(), requests);

    store.dispatch(CounterAction::Touch);
    assert_eq!(consumer.requests(), requests);
}

#[test]
fn e2e_bound_handler_is_stable_across_reruns() {
    let (store, _provider, consumer) = mounted();
    store.dispatch(CounterAction::Increment);
    store.dispatch(CounterAction::Increment);

    let outputs = consumer.outputs();
    assert_eq!(outputs.len(), 3);
    let first = outputs[0].action("increment").unwrap();
    for output in &outputs[1..] {
        assert!(first.ptr_eq(output.action("increment").unwrap()));
    }
}

#[test]
fn e2e_default_dispatch_prop() {
    let store = counter_store();
    let provider = Provider::new(store.clone());
    provider.mount();
    let log = CallLog::new();
    let connector = connect::<CounterState, CounterAction>("Raw")
        .map_state(StateMapping::new(|state: &CounterState| {
            Props::new().with("count", state.count)
        }))
        .build()
        .expect("valid connector");
    let consumer =
        TestConsumer::mount(&connector, provider.context(), Props::new(), RerunMode::Immediate, &log);

    let output = consumer.last_output().unwrap();
    let dispatch = output.get("dispatch").and_then(PropValue::as_dispatch).unwrap().clone();
    dispatch.call(CounterAction::Add(3));
    assert_eq!(consumer.last_output().unwrap().get_int("count"), Some(3));
}

#[test]
fn e2e_custom_merge_shapes_output() {
    let store = counter_store();
    let provider = Provider::new(store.clone());
    provider.mount();
    let log = CallLog::new();
    let connector = connect::<CounterState, CounterAction>("Merged")
        .map_state(StateMapping::new(|state: &CounterState| {
            Props::new().with("count", state.count)
        }))
        .merge(MergeMapping::new(|state, _dispatch, own| {
            let step = own.get_int("step").unwrap_or(1);
            Props::new().with("next", state.get_int("count").unwrap_or(0) + step)
        }))
        .build()
        .expect("valid connector");
    let consumer = TestConsumer::mount(
        &connector,
        provider.context(),
        Props::new().with("step", 10),
        RerunMode::Immediate,
        &log,
    );
    assert_eq!(consumer.last_output().unwrap().get_int("next"), Some(10));

    store.dispatch(CounterAction::Increment);
    let output = consumer.last_output().unwrap();
    assert_eq!(output.get_int("next"), Some(11));
    assert_eq!(output.len(), 1);
}
