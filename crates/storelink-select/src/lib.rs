#![forbid(unsafe_code)]

//! Derived-output side of storelink.
//!
//! - [`props`]: the `Props` record consumers derive, with shallow equality.
//! - [`mapping`]: user mapping functions and their classification into
//!   per-consumer sub-selectors.
//! - [`options`]: equality predicates and the pure/impure switch.
//! - [`selector`]: the memoized pipeline and its explicit state.

pub mod error;
pub mod mapping;
pub mod options;
pub mod props;
pub mod selector;

pub use error::{ConfigError, SelectorError, Stage};
pub use mapping::{DispatchMapping, Factories, MapArg, MergeMapping, StateMapping};
pub use options::ConnectOptions;
pub use props::{ActionCreator, BoundAction, BoxError, PropValue, Props, shallow_equal};
pub use selector::{SelectorFactory, SelectorPipeline, SelectorState};
