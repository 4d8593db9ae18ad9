//! Request error classification.
//!
//! Every error a handler or middleware can return is one of four
//! [`HttpError`] variants. The dispatcher maps them to wire responses with
//! an exhaustive `match`, so a new kind of failure cannot silently fall
//! through to the wrong status code.

use http::StatusCode;
use meridian_router::RouteError;
use thiserror::Error;

/// Boxed error type carried by [`HttpError::Internal`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by handlers and middleware.
pub type HttpResult<T> = Result<T, HttpError>;

/// Classification of request failures.
#[derive(Debug, Error)]
pub enum HttpError {
    /// No route matches the request path.
    #[error("route not found")]
    NotFound,

    /// The path matched but no handler covers the method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The client sent something the handler cannot accept.
    #[error("{0}")]
    BadRequest(String),

    /// Anything else. The text is logged, never sent to the client.
    #[error("internal error: {0}")]
    Internal(#[source] BoxError),
}

impl HttpError {
    /// Creates a bad request error with a `Bad request: ` prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use meridian_core::HttpError;
    ///
    /// let err = HttpError::bad_request("missing field `name`");
    /// assert_eq!(err.to_string(), "Bad request: missing field `name`");
    /// ```
    pub fn bad_request(text: impl std::fmt::Display) -> Self {
        Self::BadRequest(format!("Bad request: {text}"))
    }

    /// Wraps any error as an internal error.
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    /// Status code sent for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text body sent for this error.
    #[must_use]
    pub fn public_message(&self) -> &str {
        match self {
            Self::NotFound => "404 page not found",
            Self::MethodNotAllowed => "Method not allowed",
            Self::BadRequest(text) => text,
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Returns true for errors that should be logged as server faults.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<RouteError> for HttpError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound => Self::NotFound,
            RouteError::MethodNotAllowed => Self::MethodNotAllowed,
            other => Self::Internal(Box::new(other)),
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.into())
    }
}
