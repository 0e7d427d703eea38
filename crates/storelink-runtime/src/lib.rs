#![forbid(unsafe_code)]

//! Consumer lifecycle on top of the subscription tree and selector pipeline.
//!
//! A [`Provider`] owns the root subscription node for one store. [`connect`]
//! validates mapping arguments once and yields a [`Connector`], which creates
//! one [`ConsumerRuntime`] per consumer instance. The host drives each runtime
//! through `render` / `commit` / `mount` / `unmount` and is asked to re-run
//! through the [`Host`] trait.

pub mod connect;
pub mod consumer;
pub mod context;
pub mod host;
pub mod provider;

pub use connect::{Connect, Connector, connect};
pub use consumer::ConsumerRuntime;
pub use context::ConsumerContext;
pub use host::{Host, HostFn};
pub use provider::Provider;
