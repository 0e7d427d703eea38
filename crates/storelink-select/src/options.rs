#![forbid(unsafe_code)]

//! Equality predicates and the pure/impure switch for one connector.

use std::fmt;
use std::rc::Rc;

use crate::props::{Props, shallow_equal};

pub type StatesEqual<S> = Rc<dyn Fn(&Rc<S>, &Rc<S>) -> bool>;
pub type PropsEqual<A> = Rc<dyn Fn(&Rc<Props<A>>, &Rc<Props<A>>) -> bool>;

fn shallow_props<A>(a: &Rc<Props<A>>, b: &Rc<Props<A>>) -> bool {
    Rc::ptr_eq(a, b) || shallow_equal(a, b)
}

/// Per-connector selector configuration.
///
/// Defaults: pure, states compared by allocation, every props stage compared
/// shallowly.
pub struct ConnectOptions<S, A> {
    pub(crate) pure: bool,
    pub(crate) are_states_equal: StatesEqual<S>,
    pub(crate) are_own_props_equal: PropsEqual<A>,
    pub(crate) are_state_props_equal: PropsEqual<A>,
    pub(crate) are_merged_props_equal: PropsEqual<A>,
}

impl<S, A> Clone for ConnectOptions<S, A> {
    fn clone(&self) -> Self {
        Self {
            pure: self.pure,
            are_states_equal: Rc::clone(&self.are_states_equal),
            are_own_props_equal: Rc::clone(&self.are_own_props_equal),
            are_state_props_equal: Rc::clone(&self.are_state_props_equal),
            are_merged_props_equal: Rc::clone(&self.are_merged_props_equal),
        }
    }
}

impl<S, A> fmt::Debug for ConnectOptions<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("pure", &self.pure)
            .finish_non_exhaustive()
    }
}

impl<S: 'static, A: 'static> Default for ConnectOptions<S, A> {
    fn default() -> Self {
        Self {
            pure: true,
            are_states_equal: Rc::new(|a: &Rc<S>, b: &Rc<S>| Rc::ptr_eq(a, b)),
            are_own_props_equal: Rc::new(shallow_props::<A>),
            are_state_props_equal: Rc::new(shallow_props::<A>),
            are_merged_props_equal: Rc::new(shallow_props::<A>),
        }
    }
}

impl<S: 'static, A: 'static> ConnectOptions<S, A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` recomputes on every call and never reuses outputs.
    #[must_use]
    pub fn with_pure(mut self, pure: bool) -> Self {
        self.pure = pure;
        self
    }

    #[must_use]
    pub fn with_are_states_equal(mut self, eq: impl Fn(&Rc<S>, &Rc<S>) -> bool + 'static) -> Self {
        self.are_states_equal = Rc::new(eq);
        self
    }

    #[must_use]
    pub fn with_are_own_props_equal(
        mut self,
        eq: impl Fn(&Rc<Props<A>>, &Rc<Props<A>>) -> bool + 'static,
    ) -> Self {
        self.are_own_props_equal = Rc::new(eq);
        self
    }

    #[must_use]
    pub fn with_are_state_props_equal(
        mut self,
        eq: impl Fn(&Rc<Props<A>>, &Rc<Props<A>>) -> bool + 'static,
    ) -> Self {
        self.are_state_props_equal = Rc::new(eq);
        self
    }

    #[must_use]
    pub fn with_are_merged_props_equal(
        mut self,
        eq: impl Fn(&Rc<Props<A>>, &Rc<Props<A>>) -> bool + 'static,
    ) -> Self {
        self.are_merged_props_equal = Rc::new(eq);
        self
    }
}

impl<S, A> ConnectOptions<S, A> {
    #[must_use]
    pub fn is_pure(&self) -> bool {
        self.pure
    }

    #[must_use]
    pub fn states_equal(&self, a: &Rc<S>, b: &Rc<S>) -> bool {
        (self.are_states_equal)(a, b)
    }

    #[must_use]
    pub fn own_props_equal(&self, a: &Rc<Props<A>>, b: &Rc<Props<A>>) -> bool {
        (self.are_own_props_equal)(a, b)
    }

    #[must_use]
    pub fn state_props_equal(&self, a: &Rc<Props<A>>, b: &Rc<Props<A>>) -> bool {
        (self.are_state_props_equal)(a, b)
    }

    #[must_use]
    pub fn merged_props_equal(&self, a: &Rc<Props<A>>, b: &Rc<Props<A>>) -> bool {
        (self.are_merged_props_equal)(a, b)
    }
}
