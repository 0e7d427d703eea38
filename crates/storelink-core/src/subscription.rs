#![forbid(unsafe_code)]

//! Nested subscription tree.
//!
//! A [`SubscriptionNode`] sits between an upstream source (the store, or a
//! parent node) and its own children. Children register through
//! [`SubscriptionNode::add_nested_sub`], so every node except the root is one
//! link in its parent's [`ListenerCollection`]. The resulting tree mirrors
//! the consumer hierarchy, and a store notification walks it parent first.
//!
//! # State machine
//!
//! ```text
//!   Unsubscribed --try_subscribe--> Subscribed
//!        ^                              |
//!        +--------try_unsubscribe-------+
//! ```
//!
//! Both transitions are idempotent.
//!
//! # Invariants
//!
//! 1. The unsubscribe handle is present iff the node is subscribed upstream.
//! 2. Children are only tracked while subscribed. Teardown clears them and
//!    swaps in an inert sink, after which `notify_nested_subs` is a no-op.
//! 3. The upstream relation is fixed at construction.
//! 4. The entry point registered upstream holds the node weakly and calls the
//!    current on-change callback, if any. Swapping the callback never
//!    re-subscribes.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::batch::Batch;
use crate::listener::{Callback, ListenerCollection, Unsubscribe};
use crate::store::Subscribable;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Type-erased `subscribe` of a store.
pub type SubscribeFn = Rc<dyn Fn(Callback) -> Unsubscribe>;

/// Where a node registers itself when it subscribes.
#[derive(Clone)]
pub enum Upstream {
    /// Directly on the store.
    Store(SubscribeFn),
    /// As a nested listener of a parent node.
    Parent(SubscriptionNode),
}

impl fmt::Debug for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(_) => f.write_str("Store"),
            Self::Parent(parent) => f.debug_tuple("Parent").field(&parent.id()).finish(),
        }
    }
}

enum Children {
    Inert,
    Active(ListenerCollection),
}

struct NodeInner {
    id: u64,
    upstream: Upstream,
    batch: Rc<dyn Batch>,
    unsubscribe: RefCell<Option<Unsubscribe>>,
    children: RefCell<Children>,
    on_change: RefCell<Option<Callback>>,
}

/// One node of the subscription tree.
///
/// Cloning creates a new handle to the **same** node.
#[derive(Clone)]
pub struct SubscriptionNode {
    inner: Rc<NodeInner>,
}

/// Non-owning handle to a [`SubscriptionNode`].
#[derive(Clone)]
pub struct WeakSubscriptionNode {
    inner: Weak<NodeInner>,
}

impl WeakSubscriptionNode {
    #[must_use]
    pub fn upgrade(&self) -> Option<SubscriptionNode> {
        self.inner.upgrade().map(|inner| SubscriptionNode { inner })
    }
}

impl fmt::Debug for WeakSubscriptionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakSubscriptionNode(..)")
    }
}

impl fmt::Debug for SubscriptionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionNode")
            .field("id", &self.inner.id)
            .field("upstream", &self.inner.upstream)
            .field("subscribed", &self.is_subscribed())
            .field("children", &self.listener_count())
            .field("has_on_change", &self.inner.on_change.borrow().is_some())
            .finish()
    }
}

impl SubscriptionNode {
    /// Root node that subscribes directly to `store`.
    pub fn for_store<T>(store: Rc<T>, batch: Rc<dyn Batch>) -> Self
    where
        T: Subscribable + ?Sized + 'static,
    {
        let subscribe: SubscribeFn = Rc::new(move |listener| store.subscribe(listener));
        Self::with_upstream(Upstream::Store(subscribe), batch)
    }

    /// Child node registered under `parent`. Shares the parent's batch.
    #[must_use]
    pub fn nested(parent: &SubscriptionNode) -> Self {
        let batch = Rc::clone(&parent.inner.batch);
        Self::with_upstream(Upstream::Parent(parent.clone()), batch)
    }

    /// Node with an explicit upstream relation.
    #[must_use]
    pub fn with_upstream(upstream: Upstream, batch: Rc<dyn Batch>) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                id: next_node_id(),
                upstream,
                batch,
                unsubscribe: RefCell::new(None),
                children: RefCell::new(Children::Inert),
                on_change: RefCell::new(None),
            }),
        }
    }

    /// Process-unique identifier, for logs and diagnostics.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The parent node, if this node is nested.
    #[must_use]
    pub fn parent(&self) -> Option<&SubscriptionNode> {
        match &self.inner.upstream {
            Upstream::Parent(parent) => Some(parent),
            Upstream::Store(_) => None,
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakSubscriptionNode {
        WeakSubscriptionNode {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Assign or clear the callback run when upstream notifies this node.
    pub fn set_on_change(&self, callback: Option<Callback>) {
        let previous = std::mem::replace(&mut *self.inner.on_change.borrow_mut(), callback);
        drop(previous);
    }

    /// Whether the node is currently registered upstream.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.inner.unsubscribe.borrow().is_some()
    }

    /// Number of children currently registered on this node.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        match &*self.inner.children.borrow() {
            Children::Active(listeners) => listeners.len(),
            Children::Inert => 0,
        }
    }

    /// Unsubscribed → Subscribed. No-op when already subscribed.
    pub fn try_subscribe(&self) {
        if self.is_subscribed() {
            return;
        }
        let entry = self.entry_point();
        let handle = match &self.inner.upstream {
            Upstream::Parent(parent) => parent.add_nested_sub(entry),
            Upstream::Store(subscribe) => subscribe(entry),
        };
        *self.inner.unsubscribe.borrow_mut() = Some(handle);
        *self.inner.children.borrow_mut() =
            Children::Active(ListenerCollection::with_batch(Rc::clone(&self.inner.batch)));
        tracing::debug!(
            message = "subscription.subscribe",
            node = self.inner.id,
            parent = self.parent().map(SubscriptionNode::id)
        );
    }

    /// Subscribed → Unsubscribed. No-op when already unsubscribed.
    pub fn try_unsubscribe(&self) {
        let handle = self.inner.unsubscribe.borrow_mut().take();
        let Some(handle) = handle else {
            return;
        };
        handle.unsubscribe();
        let previous = std::mem::replace(&mut *self.inner.children.borrow_mut(), Children::Inert);
        if let Children::Active(listeners) = previous {
            listeners.clear();
        }
        tracing::debug!(message = "subscription.unsubscribe", node = self.inner.id);
    }

    /// Register a child callback, subscribing this node first if needed.
    pub fn add_nested_sub(&self, callback: Callback) -> Unsubscribe {
        self.try_subscribe();
        let listeners = match &*self.inner.children.borrow() {
            Children::Active(listeners) => listeners.clone(),
            Children::Inert => return Unsubscribe::noop(),
        };
        listeners.subscribe(callback)
    }

    /// Notify every child. Harmless after teardown.
    pub fn notify_nested_subs(&self) {
        let listeners = match &*self.inner.children.borrow() {
            Children::Active(listeners) => listeners.clone(),
            Children::Inert => return,
        };
        listeners.notify();
    }

    /// Invoke the on-change callback, if one is assigned.
    pub fn dispatch(&self) {
        Self::dispatch_inner(&self.inner);
    }

    fn dispatch_inner(inner: &NodeInner) {
        let callback = inner.on_change.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn entry_point(&self) -> Callback {
        let node = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = node.upgrade() {
                Self::dispatch_inner(&inner);
            }
        })
    }
}
