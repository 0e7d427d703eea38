#![forbid(unsafe_code)]

use std::fmt;
use std::rc::Rc;

use storelink_core::{Batch, Dispatch, Store, SubscriptionNode};

/// What a consumer mounts under: the store, its dispatch, and the nearest
/// subscribing ancestor's node.
pub struct ConsumerContext<S, A> {
    pub(crate) store: Rc<dyn Store<S, A>>,
    pub(crate) dispatch: Dispatch<A>,
    pub(crate) subscription: Option<SubscriptionNode>,
    pub(crate) batch: Rc<dyn Batch>,
}

impl<S, A> Clone for ConsumerContext<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
            dispatch: self.dispatch.clone(),
            subscription: self.subscription.clone(),
            batch: Rc::clone(&self.batch),
        }
    }
}

impl<S, A> fmt::Debug for ConsumerContext<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerContext")
            .field("subscription", &self.subscription.as_ref().map(SubscriptionNode::id))
            .finish_non_exhaustive()
    }
}

impl<S: 'static, A: 'static> ConsumerContext<S, A> {
    /// Context with no ancestor node: consumers created here subscribe to
    /// the store directly.
    pub fn for_store(store: Rc<dyn Store<S, A>>, batch: Rc<dyn Batch>) -> Self {
        let dispatch = Dispatch::for_store(Rc::clone(&store));
        Self {
            store,
            dispatch,
            subscription: None,
            batch,
        }
    }

    /// Node a new consumer's subscription should hang under.
    #[must_use]
    pub(crate) fn node_for_child(&self) -> SubscriptionNode {
        match &self.subscription {
            Some(parent) => SubscriptionNode::nested(parent),
            None => SubscriptionNode::for_store(Rc::clone(&self.store), Rc::clone(&self.batch)),
        }
    }
}

impl<S, A> ConsumerContext<S, A> {
    #[must_use]
    pub fn store(&self) -> &Rc<dyn Store<S, A>> {
        &self.store
    }

    #[must_use]
    pub fn dispatch(&self) -> &Dispatch<A> {
        &self.dispatch
    }

    #[must_use]
    pub fn subscription(&self) -> Option<&SubscriptionNode> {
        self.subscription.as_ref()
    }

    #[must_use]
    pub(crate) fn with_subscription(&self, subscription: SubscriptionNode) -> Self {
        Self {
            subscription: Some(subscription),
            ..self.clone()
        }
    }
}
