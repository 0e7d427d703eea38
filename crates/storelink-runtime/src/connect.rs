#![forbid(unsafe_code)]

//! Consumer blueprints.
//!
//! [`connect`] starts a builder for one kind of consumer. `build` classifies
//! the mapping arguments once, so a bad argument fails at setup and never
//! during a notification pass. The resulting [`Connector`] is cheap to clone
//! and creates any number of [`ConsumerRuntime`]s.
//!
//! ```ignore
//! let counter = connect("Counter")
//!     .map_state(StateMapping::new(|s: &AppState| Props::new().with("count", s.count)))
//!     .map_dispatch(Props::new().with("increment", ActionCreator::new(|_| Action::Increment)))
//!     .build()?;
//! let runtime = counter.create(provider.context(), own_props, host);
//! ```

use std::fmt;
use std::rc::Rc;

use storelink_select::mapping::{DispatchArg, MergeArg, StateArg};
use storelink_select::{ConfigError, ConnectOptions, Factories, Props, SelectorFactory};

use crate::consumer::ConsumerRuntime;
use crate::context::ConsumerContext;
use crate::host::Host;

/// Start describing a consumer named `name`.
pub fn connect<S: 'static, A: 'static>(name: impl Into<String>) -> Connect<S, A> {
    Connect::new(name)
}

/// Builder for a [`Connector`].
pub struct Connect<S, A> {
    name: String,
    map_state: StateArg<S, A>,
    map_dispatch: DispatchArg<A>,
    merge: MergeArg<A>,
    options: ConnectOptions<S, A>,
    factories: Factories<S, A>,
}

impl<S, A> fmt::Debug for Connect<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connect")
            .field("name", &self.name)
            .field("map_state", &self.map_state)
            .field("map_dispatch", &self.map_dispatch)
            .field("merge", &self.merge)
            .field("options", &self.options)
            .finish()
    }
}

impl<S: 'static, A: 'static> Connect<S, A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map_state: StateArg::Absent,
            map_dispatch: DispatchArg::Absent,
            merge: MergeArg::Absent,
            options: ConnectOptions::default(),
            factories: Factories::default(),
        }
    }

    #[must_use]
    pub fn map_state(mut self, arg: impl Into<StateArg<S, A>>) -> Self {
        self.map_state = arg.into();
        self
    }

    #[must_use]
    pub fn map_dispatch(mut self, arg: impl Into<DispatchArg<A>>) -> Self {
        self.map_dispatch = arg.into();
        self
    }

    #[must_use]
    pub fn merge(mut self, arg: impl Into<MergeArg<A>>) -> Self {
        self.merge = arg.into();
        self
    }

    #[must_use]
    pub fn options(mut self, options: ConnectOptions<S, A>) -> Self {
        self.options = options;
        self
    }

    /// Replace the recognizer lists used to classify the arguments.
    #[must_use]
    pub fn factories(mut self, factories: Factories<S, A>) -> Self {
        self.factories = factories;
        self
    }

    /// Classify the mapping arguments.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidArgument`] naming the first argument nothing
    /// recognizes, and this consumer.
    pub fn build(self) -> Result<Connector<S, A>, ConfigError> {
        let selectors = SelectorFactory::classify(
            &self.map_state,
            &self.map_dispatch,
            &self.merge,
            &self.factories,
            self.options,
            &self.name,
        )?;
        tracing::debug!(
            message = "connect.build",
            consumer = %self.name,
            handles_state_changes = selectors.handles_state_changes(),
            pure = selectors.options().is_pure()
        );
        Ok(Connector {
            name: Rc::from(self.name),
            selectors,
        })
    }
}

/// Validated consumer blueprint.
pub struct Connector<S, A> {
    name: Rc<str>,
    selectors: SelectorFactory<S, A>,
}

impl<S, A> Clone for Connector<S, A> {
    fn clone(&self) -> Self {
        Self {
            name: Rc::clone(&self.name),
            selectors: self.selectors.clone(),
        }
    }
}

impl<S, A> fmt::Debug for Connector<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name)
            .field("selectors", &self.selectors)
            .finish()
    }
}

impl<S, A> Connector<S, A> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Connect(<name>)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("Connect({})", self.name)
    }

    /// Whether consumers built here subscribe to the store.
    #[must_use]
    pub fn handles_state_changes(&self) -> bool {
        self.selectors.handles_state_changes()
    }
}

impl<S: 'static, A: 'static> Connector<S, A> {
    /// New consumer under `context`, with a fresh selector pipeline.
    ///
    /// Per-consumer factories run here, once.
    pub fn create(
        &self,
        context: &ConsumerContext<S, A>,
        own_props: Rc<Props<A>>,
        host: Rc<dyn Host>,
    ) -> ConsumerRuntime<S, A> {
        let pipeline = self.selectors.build(context.dispatch());
        ConsumerRuntime::new(
            Rc::clone(&self.name),
            context,
            pipeline,
            self.selectors.handles_state_changes(),
            own_props,
            host,
        )
    }
}
