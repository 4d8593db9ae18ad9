//! Route construction and resolution errors.

use thiserror::Error;

/// Result type alias for route operations.
pub type RouteResult<T> = Result<T, RouteError>;

/// Errors raised while building or querying a [`RouteTree`](crate::RouteTree).
///
/// Construction variants are meant to abort server setup. The two lookup
/// variants, [`RouteError::NotFound`] and [`RouteError::MethodNotAllowed`],
/// are the only ones produced while serving traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A pattern did not start with `/`.
    #[error("pattern must start with a slash: {0:?}")]
    MissingLeadingSlash(String),

    /// A catch-all segment was followed by more segments.
    #[error("catch-all segment must be the last one: {0:?}")]
    CatchAllNotLast(String),

    /// Two patterns declared different names for the same positional segment.
    #[error("positional params must have the same name, previous={previous:?}, current={current:?}")]
    ParamNameMismatch {
        /// The name already registered at this position.
        previous: String,
        /// The conflicting name.
        current: String,
    },

    /// A handler is already registered for this node and method.
    #[error("duplicate handler: {method} {path}")]
    DuplicateHandler {
        /// Method of the rejected registration (`*` for any method).
        method: String,
        /// Pattern of the rejected registration.
        path: String,
    },

    /// A subtree cannot be attached at the root pattern.
    #[error("cannot add a subtree at a root pattern, the pattern must contain a segment")]
    RootSubtree,

    /// The parent already has a child with this key.
    #[error("duplicate child: {0:?}")]
    DuplicateChild(String),

    /// No node matches the path.
    #[error("route not found")]
    NotFound,

    /// A node matches the path but has no handler for the method.
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl RouteError {
    /// Returns true for errors produced by lookups rather than construction.
    #[must_use]
    pub const fn is_lookup(&self) -> bool {
        matches!(self, Self::NotFound | Self::MethodNotAllowed)
    }
}
