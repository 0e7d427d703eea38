#![forbid(unsafe_code)]

//! storelink: many consumers observing one store, notified parent first,
//! each deriving its own memoized view.
//!
//! # Crates
//!
//! - [`core`]: listener arena, subscription tree, store contract.
//! - [`select`]: props records, mapping classification, selector pipeline.
//! - [`runtime`]: provider, `connect`, consumer lifecycle.
//!
//! Most code only needs the [`prelude`].

pub use storelink_core as core;
pub use storelink_runtime as runtime;
pub use storelink_select as select;

pub mod prelude {
    pub use storelink_core::{
        BasicStore, Batch, BatchFn, DirectBatch, Dispatch, Store, Subscribable, SubscriptionNode,
    };
    pub use storelink_runtime::{
        Connect, Connector, ConsumerContext, ConsumerRuntime, Host, HostFn, Provider, connect,
    };
    pub use storelink_select::{
        ActionCreator, BoundAction, ConfigError, ConnectOptions, DispatchMapping, Factories,
        MapArg, MergeMapping, PropValue, Props, SelectorError, StateMapping,
    };
}
