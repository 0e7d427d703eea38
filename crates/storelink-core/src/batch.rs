#![forbid(unsafe_code)]

//! Batching strategy injected into every [`ListenerCollection`].
//!
//! Each top-level [`ListenerCollection::notify`] runs its whole traversal
//! inside one call to [`Batch::batch`]. A host can use that scope to coalesce
//! the re-runs requested during the pass into a single scheduling unit.
//! [`DirectBatch`] simply runs the pass.
//!
//! [`ListenerCollection`]: crate::listener::ListenerCollection
//! [`ListenerCollection::notify`]: crate::listener::ListenerCollection::notify

use std::fmt;
use std::rc::Rc;

/// Brackets one notification pass.
///
/// Implementations must call `run` exactly once, synchronously.
pub trait Batch {
    fn batch(&self, run: &mut dyn FnMut());
}

/// Runs the pass immediately with no extra bookkeeping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirectBatch;

impl DirectBatch {
    /// Shared handle to the direct strategy.
    #[must_use]
    pub fn shared() -> Rc<dyn Batch> {
        Rc::new(Self)
    }
}

impl Batch for DirectBatch {
    fn batch(&self, run: &mut dyn FnMut()) {
        run();
    }
}

/// Adapts a closure into a [`Batch`].
pub struct BatchFn<F>(pub F);

impl<F> fmt::Debug for BatchFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BatchFn(..)")
    }
}

impl<F> Batch for BatchFn<F>
where
    F: Fn(&mut dyn FnMut()),
{
    fn batch(&self, run: &mut dyn FnMut()) {
        (self.0)(run);
    }
}
