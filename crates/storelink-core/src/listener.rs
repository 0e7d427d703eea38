#![forbid(unsafe_code)]

//! Ordered listener collection backed by an index arena.
//!
//! # Design
//!
//! Listeners live in a `Vec` of slots linked into a doubly linked list by
//! index (`prev`/`next`). Subscribing appends at the tail; the returned
//! [`Unsubscribe`] token unlinks its slot in O(1). Freed slots are recycled,
//! and every slot carries a generation counter so a stale token can never
//! remove the slot's next occupant.
//!
//! # Invariants
//!
//! 1. The linked list holds exactly the currently subscribed callbacks, in
//!    subscription order.
//! 2. Firing a token more than once, or after [`ListenerCollection::clear`],
//!    is a no-op.
//! 3. While a [`notify`](ListenerCollection::notify) walk is in flight,
//!    unlinked slots keep their forward link and are not recycled. The walk
//!    can therefore step past any node removed mid-pass, including the one
//!    currently running.
//! 4. A walk visits only linked nodes and stops at the tail captured when the
//!    pass began.
//! 5. No `RefCell` borrow of the arena is held while a callback runs.
//!
//! # Failure Modes
//!
//! - **Callback panics**: the walk guard still closes the walk, so retired
//!   slots are released and the list stays consistent.
//! - **Collection dropped while tokens are alive**: tokens hold a `Weak`
//!   reference and become inert.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::batch::{Batch, DirectBatch};

/// A notification callback.
pub type Callback = Rc<dyn Fn()>;

/// Idempotent removal handle returned by every `subscribe`.
///
/// Cloning shares the underlying action; whichever clone fires first runs it
/// and every later call does nothing.
#[derive(Clone)]
pub struct Unsubscribe {
    action: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl Unsubscribe {
    /// Wrap a removal action.
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: Rc::new(RefCell::new(Some(Box::new(action)))),
        }
    }

    /// A handle that has nothing to remove.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            action: Rc::new(RefCell::new(None)),
        }
    }

    /// Run the removal action if it has not run yet.
    pub fn unsubscribe(&self) {
        let action = self.action.borrow_mut().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether the removal action is still pending.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.action.borrow().is_some()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    callback: Option<Callback>,
    prev: Option<usize>,
    next: Option<usize>,
    generation: u64,
    linked: bool,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    free: Vec<usize>,
    /// Slots unlinked while a walk was in flight; released when the
    /// outermost walk ends.
    retired: Vec<usize>,
    walks: usize,
}

impl Arena {
    fn push_back(&mut self, callback: Callback) -> (usize, u64) {
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let prev = self.tail;
        let slot = &mut self.slots[idx];
        slot.callback = Some(callback);
        slot.prev = prev;
        slot.next = None;
        slot.linked = true;
        let generation = slot.generation;

        match prev {
            Some(p) => self.slots[p].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        (idx, generation)
    }

    /// Unlink `idx` if it still holds the listener of `generation`.
    ///
    /// Returns the detached callback so the caller can drop it after the
    /// arena borrow ends.
    fn unlink(&mut self, idx: usize, generation: u64) -> Option<Callback> {
        let slot = self.slots.get(idx)?;
        if !slot.linked || slot.generation != generation {
            return None;
        }
        let (prev, next) = (slot.prev, slot.next);
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        self.len -= 1;
        self.retire(idx)
    }

    fn retire(&mut self, idx: usize) -> Option<Callback> {
        let slot = &mut self.slots[idx];
        slot.linked = false;
        slot.prev = None;
        slot.generation = slot.generation.wrapping_add(1);
        let callback = slot.callback.take();
        if self.walks > 0 {
            // `next` stays so an in-flight walk can step past this slot.
            self.retired.push(idx);
        } else {
            slot.next = None;
            self.free.push(idx);
        }
        callback
    }

    fn clear(&mut self) -> Vec<Callback> {
        let mut detached = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            cursor = self.slots[idx].next;
            detached.extend(self.retire(idx));
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
        detached
    }

    fn end_walk(&mut self) {
        self.walks = self.walks.saturating_sub(1);
        if self.walks == 0 {
            for idx in std::mem::take(&mut self.retired) {
                self.slots[idx].next = None;
                self.free.push(idx);
            }
        }
    }
}

/// Closes a walk even if a callback unwinds.
struct WalkGuard<'a> {
    arena: &'a RefCell<Arena>,
}

impl Drop for WalkGuard<'_> {
    fn drop(&mut self) {
        self.arena.borrow_mut().end_walk();
    }
}

// ---------------------------------------------------------------------------
// ListenerCollection
// ---------------------------------------------------------------------------

/// Ordered multiset of callbacks with O(1) subscribe/unsubscribe.
///
/// Cloning creates a new handle to the **same** collection.
#[derive(Clone)]
pub struct ListenerCollection {
    arena: Rc<RefCell<Arena>>,
    batch: Rc<dyn Batch>,
}

impl Default for ListenerCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.borrow();
        f.debug_struct("ListenerCollection")
            .field("len", &arena.len)
            .field("slots", &arena.slots.len())
            .field("walks", &arena.walks)
            .finish()
    }
}

impl ListenerCollection {
    /// Empty collection that notifies through [`DirectBatch`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_batch(DirectBatch::shared())
    }

    /// Empty collection that wraps each notify pass in `batch`.
    #[must_use]
    pub fn with_batch(batch: Rc<dyn Batch>) -> Self {
        Self {
            arena: Rc::new(RefCell::new(Arena::default())),
            batch,
        }
    }

    /// Append `callback` at the tail.
    pub fn subscribe(&self, callback: Callback) -> Unsubscribe {
        let (idx, generation) = self.arena.borrow_mut().push_back(callback);
        let arena: Weak<RefCell<Arena>> = Rc::downgrade(&self.arena);
        Unsubscribe::new(move || {
            if let Some(arena) = arena.upgrade() {
                let detached = arena.borrow_mut().unlink(idx, generation);
                drop(detached);
            }
        })
    }

    /// Invoke every linked callback in subscription order, inside one batch
    /// scope.
    pub fn notify(&self) {
        let arena = Rc::clone(&self.arena);
        self.batch.batch(&mut || Self::walk(&arena));
    }

    fn walk(arena: &RefCell<Arena>) {
        let (mut cursor, stop) = {
            let mut inner = arena.borrow_mut();
            inner.walks += 1;
            (inner.head, inner.tail)
        };
        let _guard = WalkGuard { arena };

        let mut visited = 0usize;
        while let Some(idx) = cursor {
            let callback = arena.borrow().slots[idx].callback.clone();
            if let Some(callback) = callback {
                callback();
                visited += 1;
            }
            if Some(idx) == stop {
                break;
            }
            cursor = arena.borrow().slots[idx].next;
        }
        tracing::trace!(message = "listeners.notify", visited);
    }

    /// Snapshot of the registered callbacks, in order.
    #[must_use]
    pub fn get(&self) -> Vec<Callback> {
        let arena = self.arena.borrow();
        let mut out = Vec::with_capacity(arena.len);
        let mut cursor = arena.head;
        while let Some(idx) = cursor {
            let slot = &arena.slots[idx];
            out.extend(slot.callback.clone());
            cursor = slot.next;
        }
        out
    }

    /// Detach every listener without invoking it.
    pub fn clear(&self) {
        let detached = self.arena.borrow_mut().clear();
        drop(detached);
    }

    /// Number of linked listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.borrow().len
    }

    /// Whether no listener is linked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchFn;
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn recorder(log: &Log, name: &'static str) -> Callback {
        let log = Rc::clone(log);
        Rc::new(move || log.borrow_mut().push(name))
    }

    #[test]
    fn notifies_in_subscription_order() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        listeners.subscribe(recorder(&log, "a"));
        listeners.subscribe(recorder(&log, "b"));
        listeners.subscribe(recorder(&log, "c"));

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(listeners.len(), 3);
    }

    #[test]
    fn unsubscribe_removes_exact_node() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        listeners.subscribe(recorder(&log, "a"));
        let b = listeners.subscribe(recorder(&log, "b"));
        listeners.subscribe(recorder(&log, "c"));

        b.unsubscribe();
        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "c"]);
    }

    #[test]
    fn unsubscribe_twice_is_noop() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let a = listeners.subscribe(recorder(&log, "a"));
        listeners.subscribe(recorder(&log, "b"));

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(listeners.len(), 1);

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn stale_token_cannot_remove_recycled_slot() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let stale = listeners.subscribe(recorder(&log, "a"));
        listeners.clear();

        // Reuses the slot `a` occupied; its token never fired.
        listeners.subscribe(recorder(&log, "b"));
        assert!(stale.is_active());
        stale.unsubscribe();

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["b"]);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn self_removal_during_notify_keeps_walking() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let token: Rc<RefCell<Option<Unsubscribe>>> = Rc::default();

        listeners.subscribe(recorder(&log, "a"));
        let token_in = Rc::clone(&token);
        let log_in = Rc::clone(&log);
        let b = listeners.subscribe(Rc::new(move || {
            log_in.borrow_mut().push("b");
            if let Some(token) = token_in.borrow().as_ref() {
                token.unsubscribe();
            }
        }));
        *token.borrow_mut() = Some(b);
        listeners.subscribe(recorder(&log, "c"));

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);

        log.borrow_mut().clear();
        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "c"]);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn removing_unvisited_listener_skips_it() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let victim: Rc<RefCell<Option<Unsubscribe>>> = Rc::default();

        let victim_in = Rc::clone(&victim);
        let log_in = Rc::clone(&log);
        listeners.subscribe(Rc::new(move || {
            log_in.borrow_mut().push("a");
            if let Some(token) = victim_in.borrow().as_ref() {
                token.unsubscribe();
            }
        }));
        let b = listeners.subscribe(recorder(&log, "b"));
        *victim.borrow_mut() = Some(b);
        listeners.subscribe(recorder(&log, "c"));

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "c"]);
    }

    #[test]
    fn removing_consecutive_unvisited_listeners() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let victims: Rc<RefCell<Vec<Unsubscribe>>> = Rc::default();

        let victims_in = Rc::clone(&victims);
        let log_in = Rc::clone(&log);
        let a = listeners.subscribe(Rc::new(move || {
            log_in.borrow_mut().push("a");
            for token in victims_in.borrow().iter() {
                token.unsubscribe();
            }
        }));
        let b = listeners.subscribe(recorder(&log, "b"));
        let c = listeners.subscribe(recorder(&log, "c"));
        listeners.subscribe(recorder(&log, "d"));
        // `a` removes itself and both of its successors.
        victims.borrow_mut().extend([a, b, c]);

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "d"]);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn listeners_added_during_notify_wait_for_next_pass() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let added = Rc::new(Cell::new(false));

        let handle = listeners.clone();
        let log_in = Rc::clone(&log);
        let added_in = Rc::clone(&added);
        listeners.subscribe(Rc::new(move || {
            log_in.borrow_mut().push("a");
            if !added_in.replace(true) {
                handle.subscribe(recorder(&log_in, "late"));
            }
        }));

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a"]);

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "a", "late"]);
    }

    #[test]
    fn clear_during_notify_stops_remaining() {
        let log = Log::default();
        let listeners = ListenerCollection::new();

        let handle = listeners.clone();
        let log_in = Rc::clone(&log);
        listeners.subscribe(Rc::new(move || {
            log_in.borrow_mut().push("a");
            handle.clear();
        }));
        listeners.subscribe(recorder(&log, "b"));

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(listeners.is_empty());
    }

    #[test]
    fn clear_does_not_invoke() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let a = listeners.subscribe(recorder(&log, "a"));
        listeners.subscribe(recorder(&log, "b"));

        listeners.clear();
        listeners.notify();
        assert!(log.borrow().is_empty());
        assert!(listeners.get().is_empty());

        // Token of a cleared listener stays harmless.
        a.unsubscribe();
        assert!(listeners.is_empty());
    }

    #[test]
    fn get_returns_snapshot_in_order() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        listeners.subscribe(Rc::clone(&a));
        listeners.subscribe(Rc::clone(&b));

        let snapshot = listeners.get();
        assert_eq!(snapshot.len(), 2);
        assert!(Rc::ptr_eq(&snapshot[0], &a));
        assert!(Rc::ptr_eq(&snapshot[1], &b));
    }

    #[test]
    fn notify_runs_inside_one_batch() {
        let batches = Rc::new(Cell::new(0u32));
        let depth = Rc::new(Cell::new(0u32));
        let batches_in = Rc::clone(&batches);
        let depth_in = Rc::clone(&depth);
        let listeners = ListenerCollection::with_batch(Rc::new(BatchFn(
            move |run: &mut dyn FnMut()| {
                batches_in.set(batches_in.get() + 1);
                depth_in.set(depth_in.get() + 1);
                run();
                depth_in.set(depth_in.get() - 1);
            },
        )));

        let inside = Rc::new(Cell::new(0u32));
        for _ in 0..3 {
            let inside = Rc::clone(&inside);
            let depth = Rc::clone(&depth);
            listeners.subscribe(Rc::new(move || {
                if depth.get() == 1 {
                    inside.set(inside.get() + 1);
                }
            }));
        }

        listeners.notify();
        assert_eq!(batches.get(), 1);
        assert_eq!(inside.get(), 3);
    }

    #[test]
    fn nested_notify_releases_slots_after_outer_walk() {
        let log = Log::default();
        let listeners = ListenerCollection::new();
        let nested = Rc::new(Cell::new(false));
        let victim: Rc<RefCell<Option<Unsubscribe>>> = Rc::default();

        let handle = listeners.clone();
        let nested_in = Rc::clone(&nested);
        let victim_in = Rc::clone(&victim);
        let log_in = Rc::clone(&log);
        listeners.subscribe(Rc::new(move || {
            log_in.borrow_mut().push("a");
            if !nested_in.replace(true) {
                if let Some(token) = victim_in.borrow().as_ref() {
                    token.unsubscribe();
                }
                handle.notify();
            }
        }));
        let b = listeners.subscribe(recorder(&log, "b"));
        *victim.borrow_mut() = Some(b);
        listeners.subscribe(recorder(&log, "c"));

        listeners.notify();
        assert_eq!(*log.borrow(), vec!["a", "a", "c", "c"]);

        // Retired slot is reusable once both walks have ended.
        listeners.subscribe(recorder(&log, "d"));
        assert_eq!(listeners.len(), 3);
        assert_eq!(listeners.arena.borrow().slots.len(), 3);
    }

    #[test]
    fn token_outliving_collection_is_inert() {
        let listeners = ListenerCollection::new();
        let token = listeners.subscribe(Rc::new(|| {}));
        drop(listeners);
        token.unsubscribe();
        assert!(!token.is_active());
    }
}
