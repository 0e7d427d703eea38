//! Property-based invariant tests for notification through random trees.
//!
//! A random forest of counter consumers is mounted under one provider and a
//! random action sequence is dispatched, with synchronous or queued re-runs:
//!
//! 1. A consumer never selects before its parent has selected, nor before
//!    its parent's re-run in the same dispatch.
//! 2. A dispatch that changes `count` selects and re-runs every consumer
//!    exactly once.
//! 3. A dispatch that changes state but not `count` selects every consumer
//!    once and re-runs none.
//! 4. A dispatch that keeps the state allocation runs no mapping at all.
//! 5. Once a dispatch returns, every consumer shows the store's count.

use std::rc::Rc;

use proptest::prelude::*;
use proptest::sample::Index;
use storelink::prelude::*;
use storelink_harness::fixtures::{CounterAction, CounterState, count_connector, counter_store};
use storelink_harness::{BatchQueue, CallLog, RerunMode, TestConsumer};

// ── Strategies ──────────────────────────────────────────────────────────

/// `parents[i]` is `None` for a top-level consumer, else an earlier index.
fn forest() -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(any::<Index>(), 1..10).prop_map(|picks| {
        picks
            .iter()
            .enumerate()
            .map(|(i, pick)| {
                let slot = pick.index(i + 1);
                (slot < i).then_some(slot)
            })
            .collect()
    })
}

fn action() -> impl Strategy<Value = CounterAction> {
    prop_oneof![
        Just(CounterAction::Increment),
        (1i64..4).prop_map(CounterAction::Add),
        Just(CounterAction::Touch),
        Just(CounterAction::Noop),
    ]
}

fn name(i: usize) -> String {
    format!("C{i}")
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn notification_respects_tree_order(
        parents in forest(),
        actions in prop::collection::vec(action(), 1..12),
        queued in any::<bool>(),
    ) {
        let store = counter_store();
        let queue = BatchQueue::new();
        let (provider, mode) = if queued {
            (
                Provider::with_batch(store.clone(), queue.clone()),
                RerunMode::Queued(Rc::clone(&queue)),
            )
        } else {
            (Provider::new(store.clone()), RerunMode::Immediate)
        };
        provider.mount();

        let log = CallLog::new();
        let mut consumers: Vec<Rc<TestConsumer<CounterState, CounterAction>>> = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            let context = match parent {
                Some(p) => consumers[*p].child_context(),
                None => provider.context().clone(),
            };
            let connector = count_connector(&name(i), &log).expect("valid connector");
            consumers.push(TestConsumer::mount(&connector, &context, Props::new(), mode.clone(), &log));
        }

        for action in actions {
            log.clear();
            let before = store.state();
            store.dispatch(action);
            let after = store.state();

            for (i, parent) in parents.iter().enumerate() {
                let me = name(i);
                let Some(p) = parent else { continue };
                let Some(selected) = log.position(&me, "select") else { continue };
                let parent_name = name(*p);
                let parent_selected = log.position(&parent_name, "select");
                prop_assert!(parent_selected.is_some_and(|pos| pos < selected));
                if let Some(rendered) = log.position(&parent_name, "render") {
                    prop_assert!(rendered < selected);
                }
            }

            if Rc::ptr_eq(&before, &after) {
                prop_assert!(log.labels().is_empty());
            } else if before.count != after.count {
                for i in 0..parents.len() {
                    prop_assert_eq!(log.count(&name(i), "select"), 1);
                    prop_assert_eq!(log.count(&name(i), "render"), 1);
                }
            } else {
                for i in 0..parents.len() {
                    prop_assert_eq!(log.count(&name(i), "select"), 1);
                    prop_assert_eq!(log.count(&name(i), "render"), 0);
                }
            }

            for consumer in &consumers {
                let shown = consumer.last_output().and_then(|out| out.get_int("count"));
                prop_assert_eq!(shown, Some(after.count));
            }
            prop_assert_eq!(queue.queued(), 0);
        }
    }
}
