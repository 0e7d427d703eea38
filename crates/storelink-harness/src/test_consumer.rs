#![forbid(unsafe_code)]

//! Recording host for one consumer.
//!
//! A [`TestConsumer`] plays the host's role: it owns the consumer's own
//! props, re-runs the consumer when asked, and records every render in a
//! [`CallLog`]. Re-runs happen either synchronously inside the request or
//! through a [`BatchQueue`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use storelink::prelude::*;

use crate::call_log::CallLog;
use crate::queue::BatchQueue;

/// How a [`TestConsumer`] answers a re-run request.
#[derive(Clone)]
pub enum RerunMode {
    /// Re-run inside `request_rerun`.
    Immediate,
    /// Queue the re-run; it runs when the current pass ends.
    Queued(Rc<BatchQueue>),
}

impl fmt::Debug for RerunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("Immediate"),
            Self::Queued(_) => f.write_str("Queued"),
        }
    }
}

type RenderHook<A> = Box<dyn Fn(&Rc<Props<A>>)>;

pub struct TestConsumer<S, A> {
    name: String,
    runtime: ConsumerRuntime<S, A>,
    own_props: RefCell<Rc<Props<A>>>,
    outputs: RefCell<Vec<Rc<Props<A>>>>,
    errors: RefCell<Vec<SelectorError>>,
    requests: Cell<u32>,
    log: CallLog,
    on_render: RefCell<Option<RenderHook<A>>>,
}

impl<S, A> fmt::Debug for TestConsumer<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestConsumer")
            .field("name", &self.name)
            .field("renders", &self.outputs.borrow().len())
            .field("errors", &self.errors.borrow().len())
            .field("requests", &self.requests.get())
            .finish_non_exhaustive()
    }
}

fn host_for<S: 'static, A: 'static>(weak: Weak<TestConsumer<S, A>>, mode: RerunMode) -> Rc<dyn Host> {
    Rc::new(HostFn(move || {
        let Some(consumer) = weak.upgrade() else {
            return;
        };
        consumer.requests.set(consumer.requests.get() + 1);
        match &mode {
            RerunMode::Immediate => consumer.rerun(),
            RerunMode::Queued(queue) => {
                let weak = Rc::downgrade(&consumer);
                queue.defer(move || {
                    if let Some(consumer) = weak.upgrade() {
                        consumer.rerun();
                    }
                });
            }
        }
    }))
}

impl<S: 'static, A: 'static> TestConsumer<S, A> {
    /// Create, run once, and mount a consumer under `context`.
    pub fn mount(
        connector: &Connector<S, A>,
        context: &ConsumerContext<S, A>,
        own_props: Props<A>,
        mode: RerunMode,
        log: &CallLog,
    ) -> Rc<Self> {
        let own_props = Rc::new(own_props);
        let consumer = Rc::new_cyclic(|weak: &Weak<Self>| {
            let host = host_for(weak.clone(), mode);
            Self {
                name: connector.name().to_owned(),
                runtime: connector.create(context, Rc::clone(&own_props), host),
                own_props: RefCell::new(own_props),
                outputs: RefCell::new(Vec::new()),
                errors: RefCell::new(Vec::new()),
                requests: Cell::new(0),
                log: log.clone(),
                on_render: RefCell::new(None),
            }
        });
        consumer.rerun();
        consumer.runtime.mount();
        consumer
    }

    /// Render with the current own props and commit.
    pub fn rerun(&self) {
        if self.runtime.is_detached() {
            return;
        }
        let own_props = Rc::clone(&self.own_props.borrow());
        match self.runtime.render(own_props) {
            Ok(output) => {
                self.log.record(&self.name, "render");
                self.outputs.borrow_mut().push(Rc::clone(&output));
                let hook = self.on_render.borrow_mut().take();
                if let Some(hook) = hook {
                    hook(&output);
                    let mut slot = self.on_render.borrow_mut();
                    if slot.is_none() {
                        *slot = Some(hook);
                    }
                }
                self.runtime.commit();
            }
            Err(err) => {
                self.log.record(&self.name, "error");
                self.errors.borrow_mut().push(err);
            }
        }
    }

    /// Replace own props, as a parent re-run would, and re-run.
    pub fn set_own_props(&self, own_props: Props<A>) {
        *self.own_props.borrow_mut() = Rc::new(own_props);
        self.rerun();
    }

    /// Run `hook` after every successful render, before commit.
    pub fn set_on_render(&self, hook: impl Fn(&Rc<Props<A>>) + 'static) {
        *self.on_render.borrow_mut() = Some(Box::new(hook));
    }

    /// # Errors
    ///
    /// A selector error the consumer captured but never rendered.
    pub fn unmount(&self) -> Result<(), SelectorError> {
        self.runtime.unmount()
    }

    #[must_use]
    pub fn child_context(&self) -> ConsumerContext<S, A> {
        self.runtime.child_context()
    }
}

impl<S, A> TestConsumer<S, A> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn runtime(&self) -> &ConsumerRuntime<S, A> {
        &self.runtime
    }

    /// Successful renders so far, including the initial one.
    #[must_use]
    pub fn renders(&self) -> usize {
        self.outputs.borrow().len()
    }

    /// Re-run requests received from the runtime.
    #[must_use]
    pub fn requests(&self) -> u32 {
        self.requests.get()
    }

    #[must_use]
    pub fn last_output(&self) -> Option<Rc<Props<A>>> {
        self.outputs.borrow().last().cloned()
    }

    #[must_use]
    pub fn outputs(&self) -> Vec<Rc<Props<A>>> {
        self.outputs.borrow().clone()
    }

    /// Errors surfaced by `render`, oldest first.
    pub fn take_errors(&self) -> Vec<SelectorError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }
}
