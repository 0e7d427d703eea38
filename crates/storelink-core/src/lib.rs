#![forbid(unsafe_code)]

//! Core: listener bookkeeping, the nested subscription tree, and the store
//! contract the rest of storelink is written against.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`). Notification runs
//! synchronously on whichever thread dispatched to the store.

pub mod batch;
pub mod listener;
pub mod store;
pub mod subscription;

pub use batch::{Batch, BatchFn, DirectBatch};
pub use listener::{Callback, ListenerCollection, Unsubscribe};
pub use store::{BasicStore, Dispatch, Store, StoreError, Subscribable};
pub use subscription::{SubscriptionNode, Upstream, WeakSubscriptionNode};
