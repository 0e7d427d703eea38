#![forbid(unsafe_code)]

//! Deferred re-runs.
//!
//! [`BatchQueue`] is injected as the provider's batch. While any notification
//! pass is running, [`BatchQueue::defer`] queues work instead of running it.
//! When the outermost pass ends the queue drains in FIFO order; work queued
//! while draining joins the same drain.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use storelink::core::Batch;

type Job = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct BatchQueue {
    depth: Cell<u32>,
    draining: Cell<bool>,
    jobs: RefCell<VecDeque<Job>>,
    passes: Cell<u32>,
    drained: Cell<u32>,
}

impl fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchQueue")
            .field("depth", &self.depth.get())
            .field("queued", &self.jobs.borrow().len())
            .field("passes", &self.passes.get())
            .field("drained", &self.drained.get())
            .finish()
    }
}

impl BatchQueue {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Run `job` now if no pass is active, otherwise queue it.
    pub fn defer(&self, job: impl FnOnce() + 'static) {
        if self.depth.get() == 0 && !self.draining.get() {
            job();
            self.drained.set(self.drained.get() + 1);
            return;
        }
        self.jobs.borrow_mut().push_back(Box::new(job));
    }

    /// Whether a notification pass is running.
    #[must_use]
    pub fn in_pass(&self) -> bool {
        self.depth.get() > 0
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.jobs.borrow().len()
    }

    /// Outermost passes started so far.
    #[must_use]
    pub fn passes(&self) -> u32 {
        self.passes.get()
    }

    /// Jobs run so far.
    #[must_use]
    pub fn drained(&self) -> u32 {
        self.drained.get()
    }

    fn drain(&self) {
        if self.draining.replace(true) {
            return;
        }
        loop {
            let job = self.jobs.borrow_mut().pop_front();
            let Some(job) = job else {
                break;
            };
            job();
            self.drained.set(self.drained.get() + 1);
        }
        self.draining.set(false);
        tracing::trace!(message = "batch_queue.drained", total = self.drained.get());
    }
}

impl Batch for BatchQueue {
    fn batch(&self, run: &mut dyn FnMut()) {
        let depth = self.depth.get();
        if depth == 0 && !self.draining.get() {
            self.passes.set(self.passes.get() + 1);
        }
        self.depth.set(depth + 1);
        run();
        self.depth.set(depth);
        if depth == 0 {
            self.drain();
        }
    }
}
