#![forbid(unsafe_code)]

//! Test hosts for storelink.
//!
//! - [`CallLog`]: shared, ordered record of selects and renders, with JSONL
//!   export for postmortems.
//! - [`BatchQueue`]: a [`Batch`](storelink::core::Batch) that defers re-runs
//!   requested during a pass until the pass ends.
//! - [`TestConsumer`]: a host that owns one consumer runtime and re-runs it
//!   immediately or through a queue.
//! - [`fixtures`]: a counter store and logging mappings.

pub mod call_log;
pub mod fixtures;
pub mod queue;
pub mod test_consumer;

pub use call_log::{CallLog, LogEntry};
pub use queue::BatchQueue;
pub use test_consumer::{RerunMode, TestConsumer};
