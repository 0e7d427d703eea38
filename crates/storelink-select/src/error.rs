#![forbid(unsafe_code)]

use std::fmt;

use crate::props::BoxError;

/// Which mapping argument an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    MapState,
    MapDispatch,
    Merge,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MapState => "map_state",
            Self::MapDispatch => "map_dispatch",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised by a user mapping function during selection.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("{stage} failed: {source}")]
    Computation {
        stage: Stage,
        #[source]
        source: BoxError,
    },
}

impl SelectorError {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Computation { stage, .. } => *stage,
        }
    }
}

/// Raised while classifying mapping arguments at setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "invalid value of type {kind} for {argument} argument when connecting component {consumer}"
    )]
    InvalidArgument {
        kind: &'static str,
        argument: Stage,
        consumer: String,
    },
}
