#![forbid(unsafe_code)]

//! Root of the subscription tree for one store.
//!
//! The provider's node subscribes directly to the store and does nothing on a
//! change except notify its children, so every consumer below it hears about
//! a dispatch in tree order.
//!
//! # Invariants
//!
//! 1. The root node is subscribed iff the provider is mounted.
//! 2. A state change that happened between `new` and `mount` is forwarded to
//!    the children once, right after subscribing.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use storelink_core::{Batch, DirectBatch, Store, SubscriptionNode};

use crate::context::ConsumerContext;

pub struct Provider<S, A> {
    context: ConsumerContext<S, A>,
    root: SubscriptionNode,
    state_at_creation: Rc<S>,
    mounted: Cell<bool>,
}

impl<S, A> fmt::Debug for Provider<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("root", &self.root)
            .field("mounted", &self.mounted.get())
            .finish_non_exhaustive()
    }
}

impl<S: 'static, A: 'static> Provider<S, A> {
    /// Provider notifying synchronously, with no batching.
    pub fn new(store: Rc<dyn Store<S, A>>) -> Self {
        Self::with_batch(store, DirectBatch::shared())
    }

    /// Provider whose subscription tree runs every pass inside `batch`.
    pub fn with_batch(store: Rc<dyn Store<S, A>>, batch: Rc<dyn Batch>) -> Self {
        let root = SubscriptionNode::for_store(Rc::clone(&store), Rc::clone(&batch));
        let weak_root = root.downgrade();
        root.set_on_change(Some(Rc::new(move || {
            if let Some(root) = weak_root.upgrade() {
                root.notify_nested_subs();
            }
        })));

        let state_at_creation = store.state();
        let context = ConsumerContext::for_store(store, batch).with_subscription(root.clone());
        Self {
            context,
            root,
            state_at_creation,
            mounted: Cell::new(false),
        }
    }

    /// Subscribe the root node to the store.
    pub fn mount(&self) {
        if self.mounted.replace(true) {
            return;
        }
        self.root.try_subscribe();
        let changed = !Rc::ptr_eq(&self.state_at_creation, &self.context.store.state());
        tracing::debug!(message = "provider.mount", root = self.root.id(), changed);
        if changed {
            self.root.notify_nested_subs();
        }
    }

    /// Tear the tree down from the root. Idempotent.
    pub fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        self.root.try_unsubscribe();
        self.root.set_on_change(None);
        tracing::debug!(message = "provider.unmount", root = self.root.id());
    }
}

impl<S, A> Provider<S, A> {
    /// Context for top-level consumers.
    #[must_use]
    pub fn context(&self) -> &ConsumerContext<S, A> {
        &self.context
    }

    #[must_use]
    pub fn subscription(&self) -> &SubscriptionNode {
        &self.root
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }
}
