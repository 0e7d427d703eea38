#![forbid(unsafe_code)]

//! User mapping arguments and their classification.
//!
//! A connector takes three mapping arguments: one deriving props from store
//! state, one deriving props from `dispatch`, and one merging the two with the
//! consumer's own props. Each argument is a [`MapArg`]: absent, a constant
//! object, a function, or a per-consumer factory.
//!
//! Classification runs each argument through an ordered list of recognizers,
//! last to first, and takes the first match. A recognizer turns the argument
//! into an *initializer*: a closure that, given one consumer's dispatch,
//! builds that consumer's compiled sub-selector. No match is a
//! [`ConfigError`]. The lists live in [`Factories`] and can be extended;
//! recognizers pushed later are tried first.
//!
//! Default recognizers:
//!
//! | argument | kinds accepted |
//! |---|---|
//! | map_state | function, factory, absent (empty props) |
//! | map_dispatch | function, factory, object of action creators, absent (`{dispatch}`) |
//! | merge | function, absent (`{..own, ..state, ..dispatch}`) |

use std::fmt;
use std::rc::Rc;

use storelink_core::Dispatch;

use crate::error::{ConfigError, Stage};
use crate::props::{BoxError, PropValue, Props};

// ---------------------------------------------------------------------------
// User-facing mappings
// ---------------------------------------------------------------------------

type StateFn<S, A> = Rc<dyn Fn(&S, &Props<A>) -> Result<Props<A>, BoxError>>;
type DispatchFn<A> = Rc<dyn Fn(&Dispatch<A>, &Props<A>) -> Result<Props<A>, BoxError>>;
type MergeFn<A> = Rc<dyn Fn(&Props<A>, &Props<A>, &Props<A>) -> Result<Props<A>, BoxError>>;

/// Derives props from store state.
pub struct StateMapping<S, A> {
    func: StateFn<S, A>,
    depends_on_own_props: bool,
}

impl<S, A> Clone for StateMapping<S, A> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
            depends_on_own_props: self.depends_on_own_props,
        }
    }
}

impl<S, A> fmt::Debug for StateMapping<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMapping")
            .field("depends_on_own_props", &self.depends_on_own_props)
            .finish_non_exhaustive()
    }
}

impl<S: 'static, A: 'static> StateMapping<S, A> {
    pub fn new(func: impl Fn(&S) -> Props<A> + 'static) -> Self {
        Self::try_new(move |state| Ok(func(state)))
    }

    pub fn with_own_props(func: impl Fn(&S, &Props<A>) -> Props<A> + 'static) -> Self {
        Self::try_with_own_props(move |state, own| Ok(func(state, own)))
    }

    pub fn try_new(func: impl Fn(&S) -> Result<Props<A>, BoxError> + 'static) -> Self {
        Self {
            func: Rc::new(move |state: &S, _own: &Props<A>| func(state)),
            depends_on_own_props: false,
        }
    }

    pub fn try_with_own_props(
        func: impl Fn(&S, &Props<A>) -> Result<Props<A>, BoxError> + 'static,
    ) -> Self {
        Self {
            func: Rc::new(func),
            depends_on_own_props: true,
        }
    }
}

impl<S, A> StateMapping<S, A> {
    #[must_use]
    pub fn depends_on_own_props(&self) -> bool {
        self.depends_on_own_props
    }
}

/// Derives props from the consumer's dispatch.
pub struct DispatchMapping<A> {
    func: DispatchFn<A>,
    depends_on_own_props: bool,
}

impl<A> Clone for DispatchMapping<A> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
            depends_on_own_props: self.depends_on_own_props,
        }
    }
}

impl<A> fmt::Debug for DispatchMapping<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchMapping")
            .field("depends_on_own_props", &self.depends_on_own_props)
            .finish_non_exhaustive()
    }
}

impl<A: 'static> DispatchMapping<A> {
    pub fn new(func: impl Fn(&Dispatch<A>) -> Props<A> + 'static) -> Self {
        Self::try_new(move |dispatch| Ok(func(dispatch)))
    }

    pub fn with_own_props(func: impl Fn(&Dispatch<A>, &Props<A>) -> Props<A> + 'static) -> Self {
        Self::try_with_own_props(move |dispatch, own| Ok(func(dispatch, own)))
    }

    pub fn try_new(func: impl Fn(&Dispatch<A>) -> Result<Props<A>, BoxError> + 'static) -> Self {
        Self {
            func: Rc::new(move |dispatch: &Dispatch<A>, _own: &Props<A>| func(dispatch)),
            depends_on_own_props: false,
        }
    }

    pub fn try_with_own_props(
        func: impl Fn(&Dispatch<A>, &Props<A>) -> Result<Props<A>, BoxError> + 'static,
    ) -> Self {
        Self {
            func: Rc::new(func),
            depends_on_own_props: true,
        }
    }
}

impl<A> DispatchMapping<A> {
    #[must_use]
    pub fn depends_on_own_props(&self) -> bool {
        self.depends_on_own_props
    }
}

/// Combines `(state_props, dispatch_props, own_props)` into the final output.
pub struct MergeMapping<A> {
    func: MergeFn<A>,
}

impl<A> Clone for MergeMapping<A> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<A> fmt::Debug for MergeMapping<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MergeMapping(..)")
    }
}

impl<A: 'static> MergeMapping<A> {
    pub fn new(func: impl Fn(&Props<A>, &Props<A>, &Props<A>) -> Props<A> + 'static) -> Self {
        Self::try_new(move |state, dispatch, own| Ok(func(state, dispatch, own)))
    }

    pub fn try_new(
        func: impl Fn(&Props<A>, &Props<A>, &Props<A>) -> Result<Props<A>, BoxError> + 'static,
    ) -> Self {
        Self {
            func: Rc::new(func),
        }
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// One mapping argument as supplied to `connect`.
pub enum MapArg<M, A> {
    Absent,
    /// A constant record. Only `map_dispatch` accepts this by default.
    Object(Props<A>),
    Function(M),
    /// Called once per consumer to produce that consumer's mapping.
    Factory(Rc<dyn Fn() -> M>),
}

impl<M: Clone, A> Clone for MapArg<M, A> {
    fn clone(&self) -> Self {
        match self {
            Self::Absent => Self::Absent,
            Self::Object(props) => Self::Object(props.clone()),
            Self::Function(mapping) => Self::Function(mapping.clone()),
            Self::Factory(factory) => Self::Factory(Rc::clone(factory)),
        }
    }
}

impl<M, A> fmt::Debug for MapArg<M, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapArg::{}", self.kind())
    }
}

impl<M, A> Default for MapArg<M, A> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<M, A> MapArg<M, A> {
    /// Per-consumer factory argument.
    pub fn factory(factory: impl Fn() -> M + 'static) -> Self {
        Self::Factory(Rc::new(factory))
    }

    /// Name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
            Self::Factory(_) => "factory",
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl<S, A> From<StateMapping<S, A>> for MapArg<StateMapping<S, A>, A> {
    fn from(mapping: StateMapping<S, A>) -> Self {
        Self::Function(mapping)
    }
}

impl<A> From<DispatchMapping<A>> for MapArg<DispatchMapping<A>, A> {
    fn from(mapping: DispatchMapping<A>) -> Self {
        Self::Function(mapping)
    }
}

impl<A> From<Props<A>> for MapArg<DispatchMapping<A>, A> {
    fn from(creators: Props<A>) -> Self {
        Self::Object(creators)
    }
}

impl<A> From<MergeMapping<A>> for MapArg<MergeMapping<A>, A> {
    fn from(mapping: MergeMapping<A>) -> Self {
        Self::Function(mapping)
    }
}

pub type StateArg<S, A> = MapArg<StateMapping<S, A>, A>;
pub type DispatchArg<A> = MapArg<DispatchMapping<A>, A>;
pub type MergeArg<A> = MapArg<MergeMapping<A>, A>;

// ---------------------------------------------------------------------------
// Compiled sub-selectors
// ---------------------------------------------------------------------------

pub type StateSelect<S, A> = Rc<dyn Fn(&S, &Props<A>) -> Result<Rc<Props<A>>, BoxError>>;
/// Dispatch is captured when the sub-selector is built.
pub type DispatchSelect<A> = Rc<dyn Fn(&Props<A>) -> Result<Rc<Props<A>>, BoxError>>;
pub type MergeSelect<A> = Rc<dyn Fn(&Props<A>, &Props<A>, &Props<A>) -> Result<Rc<Props<A>>, BoxError>>;

/// A compiled sub-selector plus its static own-props dependency flag.
pub struct Subselector<F> {
    pub run: F,
    pub depends_on_own_props: bool,
}

impl<F: Clone> Clone for Subselector<F> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
            depends_on_own_props: self.depends_on_own_props,
        }
    }
}

impl<F> fmt::Debug for Subselector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subselector")
            .field("depends_on_own_props", &self.depends_on_own_props)
            .finish_non_exhaustive()
    }
}

pub type StateInit<S, A> = Rc<dyn Fn(&Dispatch<A>) -> Subselector<StateSelect<S, A>>>;
pub type DispatchInit<A> = Rc<dyn Fn(&Dispatch<A>) -> Subselector<DispatchSelect<A>>>;
pub type MergeInit<A> = Rc<dyn Fn(&Dispatch<A>) -> MergeSelect<A>>;

pub type StateRecognizer<S, A> = fn(&StateArg<S, A>) -> Option<StateInit<S, A>>;
pub type DispatchRecognizer<A> = fn(&DispatchArg<A>) -> Option<DispatchInit<A>>;
pub type MergeRecognizer<A> = fn(&MergeArg<A>) -> Option<MergeInit<A>>;

// ---------------------------------------------------------------------------
// Default recognizers
// ---------------------------------------------------------------------------

fn compile_state<S: 'static, A: 'static>(mapping: StateMapping<S, A>) -> Subselector<StateSelect<S, A>> {
    let func = mapping.func;
    let run: StateSelect<S, A> =
        Rc::new(move |state: &S, own: &Props<A>| func(state, own).map(Rc::new));
    Subselector {
        run,
        depends_on_own_props: mapping.depends_on_own_props,
    }
}

fn compile_dispatch<A: 'static>(
    mapping: DispatchMapping<A>,
    dispatch: &Dispatch<A>,
) -> Subselector<DispatchSelect<A>> {
    let func = mapping.func;
    let dispatch = dispatch.clone();
    let run: DispatchSelect<A> = Rc::new(move |own: &Props<A>| func(&dispatch, own).map(Rc::new));
    Subselector {
        run,
        depends_on_own_props: mapping.depends_on_own_props,
    }
}

fn constant<A: 'static>(props: Props<A>) -> Subselector<DispatchSelect<A>> {
    let props = Rc::new(props);
    let run: DispatchSelect<A> = Rc::new(move |_own: &Props<A>| Ok(Rc::clone(&props)));
    Subselector {
        run,
        depends_on_own_props: false,
    }
}

pub fn state_when_function<S: 'static, A: 'static>(arg: &StateArg<S, A>) -> Option<StateInit<S, A>> {
    let MapArg::Function(mapping) = arg else {
        return None;
    };
    let mapping = mapping.clone();
    Some(Rc::new(move |_dispatch: &Dispatch<A>| {
        compile_state(mapping.clone())
    }))
}

pub fn state_when_factory<S: 'static, A: 'static>(arg: &StateArg<S, A>) -> Option<StateInit<S, A>> {
    let MapArg::Factory(factory) = arg else {
        return None;
    };
    let factory = Rc::clone(factory);
    Some(Rc::new(move |_dispatch: &Dispatch<A>| {
        compile_state(factory())
    }))
}

pub fn state_when_absent<S: 'static, A: 'static>(arg: &StateArg<S, A>) -> Option<StateInit<S, A>> {
    if !arg.is_absent() {
        return None;
    }
    Some(Rc::new(|_dispatch: &Dispatch<A>| {
        let empty = Rc::new(Props::new());
        let run: StateSelect<S, A> =
            Rc::new(move |_state: &S, _own: &Props<A>| Ok(Rc::clone(&empty)));
        Subselector {
            run,
            depends_on_own_props: false,
        }
    }))
}

pub fn dispatch_when_function<A: 'static>(arg: &DispatchArg<A>) -> Option<DispatchInit<A>> {
    let MapArg::Function(mapping) = arg else {
        return None;
    };
    let mapping = mapping.clone();
    Some(Rc::new(move |dispatch: &Dispatch<A>| {
        compile_dispatch(mapping.clone(), dispatch)
    }))
}

pub fn dispatch_when_factory<A: 'static>(arg: &DispatchArg<A>) -> Option<DispatchInit<A>> {
    let MapArg::Factory(factory) = arg else {
        return None;
    };
    let factory = Rc::clone(factory);
    Some(Rc::new(move |dispatch: &Dispatch<A>| {
        compile_dispatch(factory(), dispatch)
    }))
}

/// `{dispatch}` when no dispatch mapping is given.
pub fn dispatch_when_absent<A: 'static>(arg: &DispatchArg<A>) -> Option<DispatchInit<A>> {
    if !arg.is_absent() {
        return None;
    }
    Some(Rc::new(|dispatch: &Dispatch<A>| {
        constant(Props::new().with("dispatch", PropValue::Dispatch(dispatch.clone())))
    }))
}

/// Binds every action creator in the object to the consumer's dispatch once.
/// Entries that are not action creators are dropped.
pub fn dispatch_when_object<A: 'static>(arg: &DispatchArg<A>) -> Option<DispatchInit<A>> {
    let MapArg::Object(creators) = arg else {
        return None;
    };
    let creators = creators.clone();
    Some(Rc::new(move |dispatch: &Dispatch<A>| {
        let bound: Props<A> = creators
            .iter()
            .filter_map(|(key, value)| match value {
                PropValue::Creator(creator) => {
                    Some((key.to_owned(), PropValue::Action(creator.bind(dispatch))))
                }
                _ => None,
            })
            .collect();
        constant(bound)
    }))
}

pub fn merge_when_function<A: 'static>(arg: &MergeArg<A>) -> Option<MergeInit<A>> {
    let MapArg::Function(mapping) = arg else {
        return None;
    };
    let func = Rc::clone(&mapping.func);
    Some(Rc::new(move |_dispatch: &Dispatch<A>| {
        let func = Rc::clone(&func);
        let select: MergeSelect<A> =
            Rc::new(move |state: &Props<A>, dispatch: &Props<A>, own: &Props<A>| {
                func(state, dispatch, own).map(Rc::new)
            });
        select
    }))
}

/// Default merge: own props, then state props, then dispatch props.
pub fn merge_when_absent<A: 'static>(arg: &MergeArg<A>) -> Option<MergeInit<A>> {
    if !arg.is_absent() {
        return None;
    }
    Some(Rc::new(|_dispatch: &Dispatch<A>| {
        let select: MergeSelect<A> =
            Rc::new(|state: &Props<A>, dispatch: &Props<A>, own: &Props<A>| {
                Ok(Rc::new(default_merge(state, dispatch, own)))
            });
        select
    }))
}

/// `{..own, ..state, ..dispatch}`.
#[must_use]
pub fn default_merge<A>(state: &Props<A>, dispatch: &Props<A>, own: &Props<A>) -> Props<A> {
    let mut merged = own.clone();
    merged.extend_from(state);
    merged.extend_from(dispatch);
    merged
}

// ---------------------------------------------------------------------------
// Recognizer lists
// ---------------------------------------------------------------------------

/// Ordered recognizer lists, one per mapping argument.
pub struct Factories<S, A> {
    pub map_state: Vec<StateRecognizer<S, A>>,
    pub map_dispatch: Vec<DispatchRecognizer<A>>,
    pub merge: Vec<MergeRecognizer<A>>,
}

impl<S, A> Clone for Factories<S, A> {
    fn clone(&self) -> Self {
        Self {
            map_state: self.map_state.clone(),
            map_dispatch: self.map_dispatch.clone(),
            merge: self.merge.clone(),
        }
    }
}

impl<S, A> fmt::Debug for Factories<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factories")
            .field("map_state", &self.map_state.len())
            .field("map_dispatch", &self.map_dispatch.len())
            .field("merge", &self.merge.len())
            .finish()
    }
}

impl<S: 'static, A: 'static> Default for Factories<S, A> {
    fn default() -> Self {
        Self {
            map_state: vec![
                state_when_function::<S, A>,
                state_when_factory::<S, A>,
                state_when_absent::<S, A>,
            ],
            map_dispatch: vec![
                dispatch_when_function::<A>,
                dispatch_when_factory::<A>,
                dispatch_when_absent::<A>,
                dispatch_when_object::<A>,
            ],
            merge: vec![merge_when_function::<A>, merge_when_absent::<A>],
        }
    }
}

impl<S: 'static, A: 'static> Factories<S, A> {
    /// Add a `map_state` recognizer, tried before every existing one.
    #[must_use]
    pub fn with_map_state(mut self, recognizer: StateRecognizer<S, A>) -> Self {
        self.map_state.push(recognizer);
        self
    }

    #[must_use]
    pub fn with_map_dispatch(mut self, recognizer: DispatchRecognizer<A>) -> Self {
        self.map_dispatch.push(recognizer);
        self
    }

    #[must_use]
    pub fn with_merge(mut self, recognizer: MergeRecognizer<A>) -> Self {
        self.merge.push(recognizer);
        self
    }
}

/// Try `recognizers` last to first; the first match wins.
///
/// # Errors
///
/// [`ConfigError::InvalidArgument`] when nothing recognizes `arg`.
pub fn match_arg<M, A, T>(
    arg: &MapArg<M, A>,
    recognizers: &[fn(&MapArg<M, A>) -> Option<T>],
    argument: Stage,
    consumer: &str,
) -> Result<T, ConfigError> {
    recognizers
        .iter()
        .rev()
        .find_map(|recognize| recognize(arg))
        .ok_or_else(|| ConfigError::InvalidArgument {
            kind: arg.kind(),
            argument,
            consumer: consumer.to_owned(),
        })
}
