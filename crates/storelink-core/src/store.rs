#![forbid(unsafe_code)]

//! Store contract.
//!
//! storelink never owns application state. It talks to an external store
//! through two traits: [`Subscribable`] for change notification and
//! [`Store`] for reading the current snapshot and dispatching actions.
//! State snapshots are handed out as `Rc<S>`; a store signals "unchanged" by
//! returning the same allocation, which the selector layer compares with
//! [`Rc::ptr_eq`].
//!
//! [`BasicStore`] is a small reducer-driven implementation used by tests,
//! benches, and the harness.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::listener::{Callback, Unsubscribe};

/// Anything that can register a change listener.
pub trait Subscribable {
    /// Register `listener`; the returned handle removes it.
    fn subscribe(&self, listener: Callback) -> Unsubscribe;
}

/// The external state container.
pub trait Store<S, A>: Subscribable {
    /// Current state snapshot.
    fn state(&self) -> Rc<S>;

    /// Send an action to the store.
    fn dispatch(&self, action: A);
}

/// Cloneable dispatch function handed to mapping functions.
pub struct Dispatch<A> {
    func: Rc<dyn Fn(A)>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatch(..)")
    }
}

impl<A: 'static> Dispatch<A> {
    pub fn new(func: impl Fn(A) + 'static) -> Self {
        Self {
            func: Rc::new(func),
        }
    }

    /// Dispatch that forwards to `store`.
    pub fn for_store<S: 'static>(store: Rc<dyn Store<S, A>>) -> Self {
        Self::new(move |action| store.dispatch(action))
    }
}

impl<A> Dispatch<A> {
    pub fn call(&self, action: A) {
        (self.func)(action);
    }

    /// Whether both handles dispatch through the same function.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

/// Errors raised by [`BasicStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("reducers may not dispatch actions")]
    DispatchInReducer,
}

type Reducer<S, A> = Box<dyn Fn(&Rc<S>, A) -> Rc<S>>;

/// Minimal reducer-driven store.
///
/// The reducer returns the input `Rc` to signal "no change". Listeners are
/// snapshotted at the start of each dispatch: a listener added during a
/// notification first runs on the next dispatch, and one removed during a
/// notification still runs for the current one.
pub struct BasicStore<S, A> {
    state: RefCell<Rc<S>>,
    reducer: Reducer<S, A>,
    listeners: Rc<RefCell<Vec<(u64, Callback)>>>,
    next_listener: Cell<u64>,
    dispatching: Cell<bool>,
}

impl<S, A> fmt::Debug for BasicStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicStore")
            .field("listeners", &self.listener_count())
            .field("dispatching", &self.dispatching.get())
            .finish()
    }
}

impl<S, A> BasicStore<S, A> {
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl<S: 'static, A: 'static> BasicStore<S, A> {
    pub fn new(initial: S, reducer: impl Fn(&Rc<S>, A) -> Rc<S> + 'static) -> Self {
        Self {
            state: RefCell::new(Rc::new(initial)),
            reducer: Box::new(reducer),
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_listener: Cell::new(0),
            dispatching: Cell::new(false),
        }
    }

    /// Replace the state without running the reducer and without notifying.
    ///
    /// Used to model a store that changed before anyone subscribed.
    pub fn replace_state(&self, state: S) {
        *self.state.borrow_mut() = Rc::new(state);
    }

    /// Run the reducer, then notify a snapshot of the listeners.
    ///
    /// # Errors
    ///
    /// [`StoreError::DispatchInReducer`] if called from inside the reducer.
    pub fn try_dispatch(&self, action: A) -> Result<(), StoreError> {
        if self.dispatching.replace(true) {
            return Err(StoreError::DispatchInReducer);
        }
        let current = Rc::clone(&self.state.borrow());
        let next = (self.reducer)(&current, action);
        self.dispatching.set(false);

        let changed = !Rc::ptr_eq(&current, &next);
        *self.state.borrow_mut() = next;

        let snapshot: Vec<Callback> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        tracing::trace!(message = "store.dispatch", changed, listeners = snapshot.len());
        for listener in snapshot {
            listener();
        }
        Ok(())
    }
}

impl<S: 'static, A: 'static> Subscribable for BasicStore<S, A> {
    fn subscribe(&self, listener: Callback) -> Unsubscribe {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));

        let listeners = Rc::downgrade(&self.listeners);
        Unsubscribe::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                let removed = {
                    let mut listeners = listeners.borrow_mut();
                    listeners
                        .iter()
                        .position(|(entry, _)| *entry == id)
                        .map(|index| listeners.remove(index))
                };
                drop(removed);
            }
        })
    }
}

impl<S: 'static, A: 'static> Store<S, A> for BasicStore<S, A> {
    fn state(&self) -> Rc<S> {
        Rc::clone(&self.state.borrow())
    }

    fn dispatch(&self, action: A) {
        if let Err(err) = self.try_dispatch(action) {
            tracing::warn!(message = "store.dispatch.rejected", error = %err);
        }
    }
}
