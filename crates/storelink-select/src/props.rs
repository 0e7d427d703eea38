#![forbid(unsafe_code)]

//! Derived-output records.
//!
//! A [`Props`] is an ordered map from key to [`PropValue`]. Consumers receive
//! their derived output as `Rc<Props<A>>`; two outputs are "the same object"
//! when the `Rc`s point at the same allocation, and "equal" when they are
//! [`shallow_equal`].
//!
//! # Value identity
//!
//! [`PropValue`] equality compares one level deep:
//! - scalars compare by value, floats with `NaN == NaN` and `0.0 != -0.0`;
//! - strings compare by content;
//! - lists, nested records and every callable compare by allocation.
//!
//! So a record holding a freshly allocated nested record is *not* shallow
//! equal to one holding an equal-but-distinct copy.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use storelink_core::Dispatch;

/// Error type returned by user mapping functions.
pub type BoxError = Box<dyn std::error::Error + 'static>;

// ---------------------------------------------------------------------------
// Action creators
// ---------------------------------------------------------------------------

/// Builds an action from call arguments. Not yet tied to a store.
pub struct ActionCreator<A> {
    func: Rc<dyn Fn(&[PropValue<A>]) -> A>,
}

impl<A> Clone for ActionCreator<A> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<A> fmt::Debug for ActionCreator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionCreator(..)")
    }
}

impl<A: 'static> ActionCreator<A> {
    pub fn new(func: impl Fn(&[PropValue<A>]) -> A + 'static) -> Self {
        Self {
            func: Rc::new(func),
        }
    }

    #[must_use]
    pub fn create(&self, args: &[PropValue<A>]) -> A {
        (self.func)(args)
    }

    /// Tie this creator to `dispatch`.
    #[must_use]
    pub fn bind(&self, dispatch: &Dispatch<A>) -> BoundAction<A> {
        BoundAction {
            inner: Rc::new(Bound {
                creator: self.clone(),
                dispatch: dispatch.clone(),
            }),
        }
    }
}

impl<A> ActionCreator<A> {
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

struct Bound<A> {
    creator: ActionCreator<A>,
    dispatch: Dispatch<A>,
}

/// An action creator bound to a dispatch: calling it dispatches.
pub struct BoundAction<A> {
    inner: Rc<Bound<A>>,
}

impl<A> Clone for BoundAction<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for BoundAction<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoundAction(..)")
    }
}

impl<A: 'static> BoundAction<A> {
    /// Build the action and dispatch it.
    pub fn call(&self, args: &[PropValue<A>]) {
        let action = self.inner.creator.create(args);
        self.inner.dispatch.call(action);
    }
}

impl<A> BoundAction<A> {
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// One field of a [`Props`] record.
pub enum PropValue<A> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<[PropValue<A>]>),
    Record(Rc<Props<A>>),
    Creator(ActionCreator<A>),
    Action(BoundAction<A>),
    Dispatch(Dispatch<A>),
}

impl<A> Clone for PropValue<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Bool(v) => Self::Bool(*v),
            Self::Int(v) => Self::Int(*v),
            Self::Float(v) => Self::Float(*v),
            Self::Str(v) => Self::Str(Rc::clone(v)),
            Self::List(v) => Self::List(Rc::clone(v)),
            Self::Record(v) => Self::Record(Rc::clone(v)),
            Self::Creator(v) => Self::Creator(v.clone()),
            Self::Action(v) => Self::Action(v.clone()),
            Self::Dispatch(v) => Self::Dispatch(v.clone()),
        }
    }
}

impl<A> fmt::Debug for PropValue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::List(v) => f.debug_list().entries(v.iter()).finish(),
            Self::Record(v) => fmt::Debug::fmt(v, f),
            Self::Creator(v) => fmt::Debug::fmt(v, f),
            Self::Action(v) => fmt::Debug::fmt(v, f),
            Self::Dispatch(v) => fmt::Debug::fmt(v, f),
        }
    }
}

impl<A> PartialEq for PropValue<A> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => same_float(*a, *b),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Record(a), Self::Record(b)) => Rc::ptr_eq(a, b),
            (Self::Creator(a), Self::Creator(b)) => a.ptr_eq(b),
            (Self::Action(a), Self::Action(b)) => a.ptr_eq(b),
            (Self::Dispatch(a), Self::Dispatch(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

fn same_float(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

impl<A> PropValue<A> {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(&**v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Rc<Props<A>>> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_action(&self) -> Option<&BoundAction<A>> {
        match self {
            Self::Action(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dispatch(&self) -> Option<&Dispatch<A>> {
        match self {
            Self::Dispatch(v) => Some(v),
            _ => None,
        }
    }
}

impl<A> From<bool> for PropValue<A> {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<A> From<i64> for PropValue<A> {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl<A> From<i32> for PropValue<A> {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl<A> From<f64> for PropValue<A> {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl<A> From<&str> for PropValue<A> {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl<A> From<String> for PropValue<A> {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl<A> From<Vec<PropValue<A>>> for PropValue<A> {
    fn from(v: Vec<PropValue<A>>) -> Self {
        Self::List(Rc::from(v))
    }
}

impl<A> From<Props<A>> for PropValue<A> {
    fn from(v: Props<A>) -> Self {
        Self::Record(Rc::new(v))
    }
}

impl<A> From<Rc<Props<A>>> for PropValue<A> {
    fn from(v: Rc<Props<A>>) -> Self {
        Self::Record(v)
    }
}

impl<A> From<ActionCreator<A>> for PropValue<A> {
    fn from(v: ActionCreator<A>) -> Self {
        Self::Creator(v)
    }
}

impl<A> From<BoundAction<A>> for PropValue<A> {
    fn from(v: BoundAction<A>) -> Self {
        Self::Action(v)
    }
}

impl<A> From<Dispatch<A>> for PropValue<A> {
    fn from(v: Dispatch<A>) -> Self {
        Self::Dispatch(v)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Ordered key → value record.
///
/// `PartialEq` is [`shallow_equal`].
pub struct Props<A> {
    entries: BTreeMap<String, PropValue<A>>,
}

impl<A> Default for Props<A> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<A> Clone for Props<A> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<A> fmt::Debug for Props<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<A> PartialEq for Props<A> {
    fn eq(&self, other: &Self) -> bool {
        shallow_equal(self, other)
    }
}

impl<A> Props<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue<A>>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropValue<A>>,
    ) -> Option<PropValue<A>> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<PropValue<A>> {
        self.entries.remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropValue<A>> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropValue::as_int)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PropValue::as_bool)
    }

    #[must_use]
    pub fn action(&self, key: &str) -> Option<&BoundAction<A>> {
        self.get(key).and_then(PropValue::as_action)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue<A>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Copy every entry of `other` into `self`; `other` wins on conflicts.
    pub fn extend_from(&mut self, other: &Props<A>) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

impl<A, K, V> FromIterator<(K, V)> for Props<A>
where
    K: Into<String>,
    V: Into<PropValue<A>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Same key set, and every value equal under [`PropValue`] identity.
#[must_use]
pub fn shallow_equal<A>(a: &Props<A>, b: &Props<A>) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    a.entries.len() == b.entries.len()
        && a
            .entries
            .iter()
            .all(|(key, value)| b.entries.get(key).is_some_and(|other| value == other))
}
