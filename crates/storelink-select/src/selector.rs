#![forbid(unsafe_code)]

//! Memoized derived-output pipeline.
//!
//! A [`SelectorPipeline`] turns `(state, own_props)` into merged props using
//! three compiled sub-selectors. Its memory lives outside it, in a
//! [`SelectorState`] owned by the consumer and passed in by `&mut`, so one
//! pipeline value is immutable and every consumer has its own cache.
//!
//! # Pure mode
//!
//! | call | own props | state | action |
//! |---|---|---|---|
//! | first | | | compute all three, cache |
//! | later | changed | changed | state props; dispatch props if own-props dependent; merge |
//! | later | changed | same | each sub-selector only if own-props dependent; merge |
//! | later | same | changed | state props; merge only if they changed |
//! | later | same | same | cached merged props |
//!
//! A freshly merged result equal to the cached one under
//! `are_merged_props_equal` is dropped in favour of the cached `Rc`.
//!
//! # Impure mode
//!
//! Every call recomputes all three stages and returns a new `Rc`.
//!
//! # Failure Modes
//!
//! A failing sub-selector returns [`SelectorError::Computation`] tagged with
//! its stage and leaves the [`SelectorState`] exactly as it was.

use std::fmt;
use std::rc::Rc;

use storelink_core::Dispatch;

use crate::error::{ConfigError, SelectorError, Stage};
use crate::mapping::{
    DispatchArg, DispatchInit, DispatchSelect, Factories, MergeArg, MergeInit, MergeSelect,
    StateArg, StateInit, StateSelect, Subselector, match_arg,
};
use crate::options::ConnectOptions;
use crate::props::{BoxError, Props};

// ---------------------------------------------------------------------------
// Memo
// ---------------------------------------------------------------------------

struct Snapshot<S, A> {
    state: Rc<S>,
    own_props: Rc<Props<A>>,
    state_props: Rc<Props<A>>,
    dispatch_props: Rc<Props<A>>,
    merged: Rc<Props<A>>,
}

impl<S, A> Clone for Snapshot<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            own_props: Rc::clone(&self.own_props),
            state_props: Rc::clone(&self.state_props),
            dispatch_props: Rc::clone(&self.dispatch_props),
            merged: Rc::clone(&self.merged),
        }
    }
}

/// Last inputs and outputs of one consumer's pipeline.
pub struct SelectorState<S, A> {
    last: Option<Snapshot<S, A>>,
}

impl<S, A> Default for SelectorState<S, A> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<S, A> fmt::Debug for SelectorState<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorState")
            .field("has_run", &self.has_run())
            .finish()
    }
}

impl<S, A> SelectorState<S, A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pipeline has completed at least one call.
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.last.is_some()
    }

    /// Merged props from the last successful call.
    #[must_use]
    pub fn merged(&self) -> Option<&Rc<Props<A>>> {
        self.last.as_ref().map(|last| &last.merged)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One consumer's compiled selector.
pub struct SelectorPipeline<S, A> {
    map_state: Subselector<StateSelect<S, A>>,
    map_dispatch: Subselector<DispatchSelect<A>>,
    merge: MergeSelect<A>,
    options: ConnectOptions<S, A>,
}

impl<S, A> fmt::Debug for SelectorPipeline<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorPipeline")
            .field("map_state", &self.map_state)
            .field("map_dispatch", &self.map_dispatch)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn stage_error(stage: Stage) -> impl FnOnce(BoxError) -> SelectorError {
    move |source| SelectorError::Computation { stage, source }
}

impl<S, A> SelectorPipeline<S, A> {
    #[must_use]
    pub fn new(
        map_state: Subselector<StateSelect<S, A>>,
        map_dispatch: Subselector<DispatchSelect<A>>,
        merge: MergeSelect<A>,
        options: ConnectOptions<S, A>,
    ) -> Self {
        Self {
            map_state,
            map_dispatch,
            merge,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConnectOptions<S, A> {
        &self.options
    }

    /// Derive merged props for `(state, own_props)`.
    ///
    /// # Errors
    ///
    /// The first failing stage, wrapped in [`SelectorError::Computation`].
    /// `memo` is only updated on success.
    pub fn select(
        &self,
        memo: &mut SelectorState<S, A>,
        state: &Rc<S>,
        own_props: &Rc<Props<A>>,
    ) -> Result<Rc<Props<A>>, SelectorError> {
        let next = match (&memo.last, self.options.pure) {
            (Some(last), true) => self.subsequent(last, state, own_props)?,
            _ => self.compute_all(state, own_props)?,
        };
        let merged = Rc::clone(&next.merged);
        memo.last = Some(next);
        Ok(merged)
    }

    fn run_state(&self, state: &S, own: &Props<A>) -> Result<Rc<Props<A>>, SelectorError> {
        (self.map_state.run)(state, own).map_err(stage_error(Stage::MapState))
    }

    fn run_dispatch(&self, own: &Props<A>) -> Result<Rc<Props<A>>, SelectorError> {
        (self.map_dispatch.run)(own).map_err(stage_error(Stage::MapDispatch))
    }

    fn run_merge(
        &self,
        state_props: &Props<A>,
        dispatch_props: &Props<A>,
        own: &Props<A>,
    ) -> Result<Rc<Props<A>>, SelectorError> {
        (self.merge)(state_props, dispatch_props, own).map_err(stage_error(Stage::Merge))
    }

    fn compute_all(
        &self,
        state: &Rc<S>,
        own_props: &Rc<Props<A>>,
    ) -> Result<Snapshot<S, A>, SelectorError> {
        let state_props = self.run_state(state, own_props)?;
        let dispatch_props = self.run_dispatch(own_props)?;
        let merged = self.run_merge(&state_props, &dispatch_props, own_props)?;
        tracing::trace!(message = "selector.compute_all", pure = self.options.pure);
        Ok(Snapshot {
            state: Rc::clone(state),
            own_props: Rc::clone(own_props),
            state_props,
            dispatch_props,
            merged,
        })
    }

    fn subsequent(
        &self,
        last: &Snapshot<S, A>,
        state: &Rc<S>,
        own_props: &Rc<Props<A>>,
    ) -> Result<Snapshot<S, A>, SelectorError> {
        let props_changed = !self.options.own_props_equal(own_props, &last.own_props);
        let state_changed = !self.options.states_equal(state, &last.state);

        let mut next = last.clone();
        next.state = Rc::clone(state);
        next.own_props = Rc::clone(own_props);

        let decision = match (props_changed, state_changed) {
            (true, true) => {
                next.state_props = self.run_state(state, own_props)?;
                if self.map_dispatch.depends_on_own_props {
                    next.dispatch_props = self.run_dispatch(own_props)?;
                }
                self.merge_into(&mut next, last)?;
                "new_state_and_props"
            }
            (true, false) => {
                if self.map_state.depends_on_own_props {
                    next.state_props = self.run_state(state, own_props)?;
                }
                if self.map_dispatch.depends_on_own_props {
                    next.dispatch_props = self.run_dispatch(own_props)?;
                }
                self.merge_into(&mut next, last)?;
                "new_props"
            }
            (false, true) => {
                let state_props = self.run_state(state, own_props)?;
                let state_props_changed =
                    !self.options.state_props_equal(&state_props, &last.state_props);
                next.state_props = state_props;
                if state_props_changed {
                    self.merge_into(&mut next, last)?;
                    "new_state"
                } else {
                    "new_state_same_props"
                }
            }
            (false, false) => "unchanged",
        };
        tracing::trace!(message = "selector.memo", decision);
        Ok(next)
    }

    fn merge_into(&self, next: &mut Snapshot<S, A>, last: &Snapshot<S, A>) -> Result<(), SelectorError> {
        let merged = self.run_merge(&next.state_props, &next.dispatch_props, &next.own_props)?;
        next.merged = if self.options.merged_props_equal(&merged, &last.merged) {
            Rc::clone(&last.merged)
        } else {
            merged
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Validated mapping arguments, ready to build one pipeline per consumer.
pub struct SelectorFactory<S, A> {
    map_state: StateInit<S, A>,
    map_dispatch: DispatchInit<A>,
    merge: MergeInit<A>,
    options: ConnectOptions<S, A>,
    handles_state_changes: bool,
}

impl<S, A> Clone for SelectorFactory<S, A> {
    fn clone(&self) -> Self {
        Self {
            map_state: Rc::clone(&self.map_state),
            map_dispatch: Rc::clone(&self.map_dispatch),
            merge: Rc::clone(&self.merge),
            options: self.options.clone(),
            handles_state_changes: self.handles_state_changes,
        }
    }
}

impl<S, A> fmt::Debug for SelectorFactory<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorFactory")
            .field("handles_state_changes", &self.handles_state_changes)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: 'static, A: 'static> SelectorFactory<S, A> {
    /// Classify the three mapping arguments for `consumer`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidArgument`] for the first argument no recognizer
    /// accepts, checked in the order map_state, map_dispatch, merge.
    pub fn classify(
        map_state: &StateArg<S, A>,
        map_dispatch: &DispatchArg<A>,
        merge: &MergeArg<A>,
        factories: &Factories<S, A>,
        options: ConnectOptions<S, A>,
        consumer: &str,
    ) -> Result<Self, ConfigError> {
        let state_init = match_arg(map_state, &factories.map_state, Stage::MapState, consumer)?;
        let dispatch_init =
            match_arg(map_dispatch, &factories.map_dispatch, Stage::MapDispatch, consumer)?;
        let merge_init = match_arg(merge, &factories.merge, Stage::Merge, consumer)?;
        Ok(Self {
            map_state: state_init,
            map_dispatch: dispatch_init,
            merge: merge_init,
            options,
            handles_state_changes: !map_state.is_absent(),
        })
    }
}

impl<S, A> SelectorFactory<S, A> {
    /// Build a fresh pipeline bound to one consumer's dispatch.
    #[must_use]
    pub fn build(&self, dispatch: &Dispatch<A>) -> SelectorPipeline<S, A> {
        SelectorPipeline::new(
            (self.map_state)(dispatch),
            (self.map_dispatch)(dispatch),
            (self.merge)(dispatch),
            self.options.clone(),
        )
    }

    /// `false` when no state mapping was given: such consumers never
    /// subscribe to the store.
    #[must_use]
    pub fn handles_state_changes(&self) -> bool {
        self.handles_state_changes
    }

    #[must_use]
    pub fn options(&self) -> &ConnectOptions<S, A> {
        &self.options
    }
}
