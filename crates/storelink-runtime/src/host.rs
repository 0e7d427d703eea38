#![forbid(unsafe_code)]

//! The host side of a consumer.
//!
//! The host owns the consumer's identity and placement. storelink only ever
//! asks it for one thing: run the consumer again. A re-run is the host calling
//! [`ConsumerRuntime::render`] with the current own props, then
//! [`ConsumerRuntime::commit`] once the output has been used.
//!
//! Expected order for a fresh consumer: `create`, `render`, `commit`, `mount`.
//!
//! [`ConsumerRuntime::render`]: crate::consumer::ConsumerRuntime::render
//! [`ConsumerRuntime::commit`]: crate::consumer::ConsumerRuntime::commit

use std::fmt;

/// Receives re-run requests for one consumer.
///
/// A host may re-run synchronously from inside `request_rerun`, or queue the
/// request and drain it when the current batch ends.
pub trait Host {
    fn request_rerun(&self);
}

/// Adapts a closure into a [`Host`].
pub struct HostFn<F>(pub F);

impl<F> fmt::Debug for HostFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostFn(..)")
    }
}

impl<F: Fn()> Host for HostFn<F> {
    fn request_rerun(&self) {
        (self.0)();
    }
}
