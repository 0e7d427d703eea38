#![forbid(unsafe_code)]

//! Per-consumer update lifecycle.
//!
//! A [`ConsumerRuntime`] ties one host-managed consumer to its subscription
//! node and selector pipeline. Store notifications arrive through
//! `check_for_updates`; the host's re-runs arrive through `render` and
//! `commit`.
//!
//! # Ordering
//!
//! When a store notification produces new output, the runtime asks the host
//! to re-run and does **not** notify its children. The children are notified
//! from `commit`, after the host has used the new output. When the output is
//! unchanged, the children are notified straight away. Either way no
//! descendant recomputes before its ancestor has finished.
//!
//! # Invariants
//!
//! 1. `rerun_scheduled` is set between a store-driven rerun request and the
//!    matching `commit` (or the `render` that surfaces an error).
//! 2. `from_store_update` holds output computed by `check_for_updates` that
//!    the host has not committed yet, together with the own props it was
//!    computed from. `render` only reuses it for those exact own props.
//! 3. After `unmount`, `check_for_updates` is a no-op.
//! 4. A `commit` whose run started before the latest store-driven update
//!    leaves that update pending.
//!
//! # Failure Modes
//!
//! A selector error inside `check_for_updates` is captured and the host is
//! asked to re-run; the next `render` returns it. The notification pass
//! continues for every other consumer. If the consumer unmounts before
//! rendering again, `unmount` returns the error.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use storelink_core::SubscriptionNode;
use storelink_select::{Props, SelectorError, SelectorPipeline, SelectorState};

use crate::context::ConsumerContext;
use crate::host::Host;

struct Staged<A> {
    own_props: Rc<Props<A>>,
    output: Rc<Props<A>>,
    /// `update_seq` when the run started.
    seen_update: u64,
}

/// Output staged by a store notification.
struct StoreUpdate<A> {
    own_props: Rc<Props<A>>,
    output: Rc<Props<A>>,
}

struct RenderCycle<A> {
    /// Own props of the last committed run.
    last_own_props: Rc<Props<A>>,
    /// Output of the last committed run, or of the last store-driven check.
    last_output: Option<Rc<Props<A>>>,
    from_store_update: Option<StoreUpdate<A>>,
    /// Bumped whenever a store notification stages new output.
    update_seq: u64,
    rerun_scheduled: bool,
    captured_error: Option<SelectorError>,
    staged: Option<Staged<A>>,
}

struct RuntimeInner<S, A> {
    name: Rc<str>,
    context: ConsumerContext<S, A>,
    pipeline: SelectorPipeline<S, A>,
    memo: RefCell<SelectorState<S, A>>,
    subscription: Option<SubscriptionNode>,
    host: Rc<dyn Host>,
    cycle: RefCell<RenderCycle<A>>,
    detached: Cell<bool>,
}

/// Lifecycle owner for one consumer instance.
///
/// Cloning creates a new handle to the **same** consumer.
pub struct ConsumerRuntime<S, A> {
    inner: Rc<RuntimeInner<S, A>>,
}

impl<S, A> Clone for ConsumerRuntime<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, A> fmt::Debug for ConsumerRuntime<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cycle = self.inner.cycle.try_borrow();
        let mut s = f.debug_struct("ConsumerRuntime");
        s.field("name", &self.inner.name)
            .field("subscription", &self.inner.subscription.as_ref().map(SubscriptionNode::id))
            .field("detached", &self.inner.detached.get());
        if let Ok(cycle) = cycle {
            s.field("rerun_scheduled", &cycle.rerun_scheduled)
                .field("pending_error", &cycle.captured_error.is_some());
        }
        s.finish_non_exhaustive()
    }
}

impl<S: 'static, A: 'static> ConsumerRuntime<S, A> {
    pub(crate) fn new(
        name: Rc<str>,
        context: &ConsumerContext<S, A>,
        pipeline: SelectorPipeline<S, A>,
        handles_state_changes: bool,
        own_props: Rc<Props<A>>,
        host: Rc<dyn Host>,
    ) -> Self {
        let subscription = handles_state_changes.then(|| context.node_for_child());
        Self {
            inner: Rc::new(RuntimeInner {
                name,
                context: context.clone(),
                pipeline,
                memo: RefCell::new(SelectorState::new()),
                subscription,
                host,
                cycle: RefCell::new(RenderCycle {
                    last_own_props: own_props,
                    last_output: None,
                    from_store_update: None,
                    update_seq: 0,
                    rerun_scheduled: false,
                    captured_error: None,
                    staged: None,
                }),
                detached: Cell::new(false),
            }),
        }
    }

    fn run_selector(&self, own_props: &Rc<Props<A>>) -> Result<Rc<Props<A>>, SelectorError> {
        let state = self.inner.context.store.state();
        let mut memo = std::mem::take(&mut *self.inner.memo.borrow_mut());
        let result = self.inner.pipeline.select(&mut memo, &state, own_props);
        *self.inner.memo.borrow_mut() = memo;
        result
    }

    /// Produce this run's output for `own_props`.
    ///
    /// The result is staged until [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// A selector error captured during a store notification is returned
    /// first, once. Otherwise any error from running the selector now.
    pub fn render(&self, own_props: Rc<Props<A>>) -> Result<Rc<Props<A>>, SelectorError> {
        let (reuse, seen_update) = {
            let mut cycle = self.inner.cycle.borrow_mut();
            if let Some(err) = cycle.captured_error.take() {
                cycle.rerun_scheduled = false;
                cycle.staged = None;
                tracing::debug!(message = "consumer.error_surfaced", consumer = %self.inner.name);
                return Err(err);
            }

            let reuse = match (&cycle.from_store_update, &cycle.last_output) {
                (Some(update), _) if Rc::ptr_eq(&own_props, &update.own_props) => {
                    Some(Rc::clone(&update.output))
                }
                (None, Some(last))
                    if self.inner.pipeline.options().is_pure()
                        && self
                            .inner
                            .pipeline
                            .options()
                            .own_props_equal(&own_props, &cycle.last_own_props) =>
                {
                    Some(Rc::clone(last))
                }
                _ => None,
            };
            (reuse, cycle.update_seq)
        };

        let output = match reuse {
            Some(output) => output,
            None => self.run_selector(&own_props)?,
        };
        tracing::trace!(message = "consumer.render", consumer = %self.inner.name);
        self.inner.cycle.borrow_mut().staged = Some(Staged {
            own_props,
            output: Rc::clone(&output),
            seen_update,
        });
        Ok(output)
    }

    /// Record the staged run as delivered.
    ///
    /// If that run consumed output from a store notification, the children
    /// are notified now. Output staged by a notification that arrived while
    /// the run was in progress stays pending for the next run.
    pub fn commit(&self) {
        let notify_children = {
            let mut cycle = self.inner.cycle.borrow_mut();
            let Some(staged) = cycle.staged.take() else {
                return;
            };
            cycle.last_own_props = staged.own_props;
            if staged.seen_update != cycle.update_seq {
                tracing::trace!(message = "consumer.commit.superseded", consumer = %self.inner.name);
                return;
            }
            cycle.last_output = Some(staged.output);
            cycle.rerun_scheduled = false;
            cycle.from_store_update.take().is_some()
        };
        if notify_children {
            self.notify_children();
        }
    }

    /// Start listening to the store. Call after the first `commit`.
    pub fn mount(&self) {
        let Some(subscription) = &self.inner.subscription else {
            return;
        };
        let weak = Rc::downgrade(&self.inner);
        subscription.set_on_change(Some(Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                ConsumerRuntime { inner }.check_for_updates();
            }
        })));
        subscription.try_subscribe();
        tracing::debug!(
            message = "consumer.mount",
            consumer = %self.inner.name,
            node = subscription.id()
        );
        self.check_for_updates();
    }

    /// Re-derive output against the latest store state.
    ///
    /// Runs from the subscription node on every notification, and once from
    /// [`mount`](Self::mount).
    pub fn check_for_updates(&self) {
        if self.inner.detached.get() {
            tracing::trace!(message = "consumer.check.detached", consumer = %self.inner.name);
            return;
        }
        let own_props = Rc::clone(&self.inner.cycle.borrow().last_own_props);
        let result = self.run_selector(&own_props);

        let request_rerun = {
            let mut cycle = self.inner.cycle.borrow_mut();
            match result {
                Err(err) => {
                    tracing::warn!(
                        message = "consumer.selector_error",
                        consumer = %self.inner.name,
                        error = %err
                    );
                    cycle.captured_error = Some(err);
                    cycle.last_output = None;
                    cycle.from_store_update = None;
                    cycle.update_seq += 1;
                    cycle.rerun_scheduled = true;
                    true
                }
                Ok(output)
                    if cycle
                        .last_output
                        .as_ref()
                        .is_some_and(|last| Rc::ptr_eq(last, &output)) =>
                {
                    if cycle.rerun_scheduled {
                        false
                    } else {
                        drop(cycle);
                        tracing::trace!(message = "consumer.check.unchanged", consumer = %self.inner.name);
                        self.notify_children();
                        return;
                    }
                }
                // A captured error is left in place; the next render surfaces
                // it before this output is delivered.
                Ok(output) => {
                    cycle.last_output = Some(Rc::clone(&output));
                    cycle.from_store_update = Some(StoreUpdate { own_props, output });
                    cycle.update_seq += 1;
                    cycle.rerun_scheduled = true;
                    true
                }
            }
        };

        if request_rerun {
            tracing::debug!(message = "consumer.rerun", consumer = %self.inner.name);
            self.inner.host.request_rerun();
        }
    }

    /// Stop listening and detach from the tree. Idempotent.
    ///
    /// # Errors
    ///
    /// A captured selector error the host never rendered.
    pub fn unmount(&self) -> Result<(), SelectorError> {
        if self.inner.detached.replace(true) {
            return Ok(());
        }
        if let Some(subscription) = &self.inner.subscription {
            subscription.try_unsubscribe();
            subscription.set_on_change(None);
        }
        tracing::debug!(message = "consumer.unmount", consumer = %self.inner.name);

        let mut cycle = self.inner.cycle.borrow_mut();
        cycle.staged = None;
        cycle.from_store_update = None;
        cycle.rerun_scheduled = false;
        match cycle.captured_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Context for consumers nested inside this one.
    #[must_use]
    pub fn child_context(&self) -> ConsumerContext<S, A> {
        match &self.inner.subscription {
            Some(subscription) => self.inner.context.with_subscription(subscription.clone()),
            None => self.inner.context.clone(),
        }
    }

    fn notify_children(&self) {
        if let Some(subscription) = &self.inner.subscription {
            subscription.notify_nested_subs();
        }
    }
}

impl<S, A> ConsumerRuntime<S, A> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `None` for consumers that do not observe the store.
    #[must_use]
    pub fn subscription(&self) -> Option<&SubscriptionNode> {
        self.inner.subscription.as_ref()
    }

    /// Output of the last committed run (or store-driven check).
    #[must_use]
    pub fn last_output(&self) -> Option<Rc<Props<A>>> {
        self.inner.cycle.borrow().last_output.clone()
    }

    #[must_use]
    pub fn is_rerun_scheduled(&self) -> bool {
        self.inner.cycle.borrow().rerun_scheduled
    }

    #[must_use]
    pub fn has_pending_error(&self) -> bool {
        self.inner.cycle.borrow().captured_error.is_some()
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.inner.detached.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::connect;
    use crate::host::HostFn;
    use crate::provider::Provider;
    use storelink_core::{BasicStore, Store};
    use storelink_select::StateMapping;
    use tracing_test::traced_test;

    type Action = i64;

    fn store() -> Rc<BasicStore<i64, Action>> {
        Rc::new(BasicStore::new(0, |s: &Rc<i64>, d: Action| {
            if d == 0 { Rc::clone(s) } else { Rc::new(**s + d) }
        }))
    }

    fn counting_host() -> (Rc<Cell<u32>>, Rc<dyn Host>) {
        let reruns = Rc::new(Cell::new(0u32));
        let reruns_in = Rc::clone(&reruns);
        (reruns, Rc::new(HostFn(move || reruns_in.set(reruns_in.get() + 1))))
    }

    fn count_consumer(
        provider: &Provider<i64, Action>,
        host: Rc<dyn Host>,
    ) -> ConsumerRuntime<i64, Action> {
        connect("Count")
            .map_state(StateMapping::new(|s: &i64| Props::new().with("count", *s)))
            .build()
            .unwrap()
            .create(provider.context(), Rc::new(Props::new()), host)
    }

    fn start(consumer: &ConsumerRuntime<i64, Action>, own: &Rc<Props<Action>>) {
        consumer.render(Rc::clone(own)).unwrap();
        consumer.commit();
        consumer.mount();
    }

    #[test]
    fn store_change_requests_one_rerun() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (reruns, host) = counting_host();
        let consumer = count_consumer(&provider, host);
        let own = Rc::new(Props::new());
        start(&consumer, &own);
        assert_eq!(reruns.get(), 0);

        store.dispatch(1);
        assert_eq!(reruns.get(), 1);
        assert!(consumer.is_rerun_scheduled());

        let out = consumer.render(Rc::clone(&own)).unwrap();
        consumer.commit();
        assert_eq!(out.get_int("count"), Some(1));
        assert!(!consumer.is_rerun_scheduled());

        store.dispatch(0);
        assert_eq!(reruns.get(), 1);
    }

    #[test]
    fn render_reuses_store_output_for_same_props() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (_reruns, host) = counting_host();
        let consumer = count_consumer(&provider, host);
        let own = Rc::new(Props::new());
        start(&consumer, &own);

        store.dispatch(3);
        let pending = consumer.last_output().unwrap();
        let rendered = consumer.render(Rc::clone(&own)).unwrap();
        assert!(Rc::ptr_eq(&pending, &rendered));
    }

    #[test]
    fn update_during_render_stays_pending_after_commit() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (reruns, host) = counting_host();
        let consumer = count_consumer(&provider, host);
        let own = Rc::new(Props::new());
        start(&consumer, &own);

        store.dispatch(1);
        let stale = consumer.render(Rc::clone(&own)).unwrap();
        store.dispatch(1);
        consumer.commit();
        assert!(consumer.is_rerun_scheduled());
        assert_eq!(reruns.get(), 2);

        let fresh = consumer.render(Rc::clone(&own)).unwrap();
        consumer.commit();
        assert_eq!(stale.get_int("count"), Some(1));
        assert_eq!(fresh.get_int("count"), Some(2));
        assert!(!consumer.is_rerun_scheduled());
    }

    #[test]
    fn store_update_for_replaced_props_is_recomputed() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (_reruns, host) = counting_host();
        let consumer = connect("Sum")
            .map_state(StateMapping::with_own_props(|s: &i64, own: &Props<Action>| {
                Props::new().with("sum", *s + own.get_int("n").unwrap_or(0))
            }))
            .build()
            .unwrap()
            .create(provider.context(), Rc::new(Props::new()), host);
        start(&consumer, &Rc::new(Props::new().with("n", 0)));

        let wider = Rc::new(Props::new().with("n", 10));
        let staged = consumer.render(Rc::clone(&wider)).unwrap();
        assert_eq!(staged.get_int("sum"), Some(10));
        store.dispatch(1);
        consumer.commit();
        assert!(consumer.is_rerun_scheduled());

        let out = consumer.render(Rc::clone(&wider)).unwrap();
        consumer.commit();
        assert_eq!(out.get_int("sum"), Some(11));
        assert!(!consumer.is_rerun_scheduled());
    }

    #[test]
    fn pure_render_with_equal_props_reuses_output() {
        let store = store();
        let provider = Provider::new(store.clone());
        let (_reruns, host) = counting_host();
        let consumer = count_consumer(&provider, host);
        let first = consumer.render(Rc::new(Props::new().with("k", 1))).unwrap();
        consumer.commit();
        let second = consumer.render(Rc::new(Props::new().with("k", 1))).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn change_between_render_and_mount_is_caught() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (reruns, host) = counting_host();
        let consumer = count_consumer(&provider, host);
        let own = Rc::new(Props::new());
        consumer.render(Rc::clone(&own)).unwrap();
        consumer.commit();

        store.dispatch(4);
        assert_eq!(reruns.get(), 0);
        consumer.mount();
        assert_eq!(reruns.get(), 1);
        assert_eq!(consumer.last_output().unwrap().get_int("count"), Some(4));
    }

    #[test]
    fn unmount_is_idempotent_and_silences_updates() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (reruns, host) = counting_host();
        let consumer = count_consumer(&provider, host);
        start(&consumer, &Rc::new(Props::new()));

        assert!(consumer.unmount().is_ok());
        assert!(consumer.unmount().is_ok());
        consumer.check_for_updates();
        store.dispatch(1);
        assert_eq!(reruns.get(), 0);
        assert!(consumer.is_detached());
        assert_eq!(provider.subscription().listener_count(), 0);
    }

    #[test]
    #[traced_test]
    fn selector_error_is_deferred_to_render() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (reruns, host) = counting_host();
        let consumer = connect("Fragile")
            .map_state(StateMapping::try_new(|s: &i64| {
                if *s < 0 {
                    Err("negative count".into())
                } else {
                    Ok(Props::new().with("count", *s))
                }
            }))
            .build()
            .unwrap()
            .create(provider.context(), Rc::new(Props::new()), host);
        let own = Rc::new(Props::new());
        start(&consumer, &own);

        store.dispatch(-1);
        assert_eq!(reruns.get(), 1);
        assert!(consumer.has_pending_error());
        assert!(logs_contain("consumer.selector_error"));

        let err = consumer.render(Rc::clone(&own)).unwrap_err();
        assert_eq!(err.to_string(), "map_state failed: negative count");
        assert!(!consumer.has_pending_error());
        assert!(!consumer.is_rerun_scheduled());
    }

    #[test]
    fn captured_error_outlives_later_successful_update() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (reruns, host) = counting_host();
        let consumer = connect("Fragile")
            .map_state(StateMapping::try_new(|s: &i64| {
                if *s < 0 {
                    Err("negative count".into())
                } else {
                    Ok(Props::new().with("count", *s))
                }
            }))
            .build()
            .unwrap()
            .create(provider.context(), Rc::new(Props::new()), host);
        let own = Rc::new(Props::new());
        start(&consumer, &own);

        store.dispatch(-1);
        store.dispatch(2);
        assert_eq!(reruns.get(), 2);
        assert!(consumer.has_pending_error());

        assert!(consumer.render(Rc::clone(&own)).is_err());
        let out = consumer.render(Rc::clone(&own)).unwrap();
        consumer.commit();
        assert_eq!(out.get_int("count"), Some(1));
        assert!(!consumer.has_pending_error());
    }

    #[test]
    fn unsurfaced_error_is_returned_from_unmount() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (_reruns, host) = counting_host();
        let consumer = connect("Fragile")
            .map_state(StateMapping::try_new(|s: &i64| {
                if *s > 0 {
                    Err("too big".into())
                } else {
                    Ok(Props::new())
                }
            }))
            .build()
            .unwrap()
            .create(provider.context(), Rc::new(Props::new()), host);
        start(&consumer, &Rc::new(Props::new()));

        store.dispatch(1);
        let err = consumer.unmount().unwrap_err();
        assert_eq!(err.stage(), storelink_select::Stage::MapState);
    }

    #[test]
    fn consumer_without_state_mapping_never_subscribes() {
        let store = store();
        let provider = Provider::new(store.clone());
        provider.mount();
        let (reruns, host) = counting_host();
        let consumer = connect::<i64, Action>("Static")
            .build()
            .unwrap()
            .create(provider.context(), Rc::new(Props::new()), host);
        start(&consumer, &Rc::new(Props::new()));

        assert!(consumer.subscription().is_none());
        store.dispatch(1);
        assert_eq!(reruns.get(), 0);
        let child = consumer.child_context();
        assert_eq!(
            child.subscription().map(SubscriptionNode::id),
            Some(provider.subscription().id())
        );
    }

    #[test]
    fn child_context_points_at_own_node() {
        let store = store();
        let provider = Provider::new(store.clone());
        let (_reruns, host) = counting_host();
        let consumer = count_consumer(&provider, host);
        let child = consumer.child_context();
        assert_eq!(
            child.subscription().map(SubscriptionNode::id),
            consumer.subscription().map(SubscriptionNode::id)
        );
        assert_eq!(consumer.name(), "Count");
    }
}
