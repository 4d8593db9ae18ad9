//! Server errors.

use std::net::SocketAddr;

use thiserror::Error;

/// Failures of the HTTP server's run body.
///
/// Raised before the listener is up, so they surface as the server
/// service's start error.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid listen address '{addr}': {source}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// The parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address being bound.
        addr: SocketAddr,
        /// The bind failure.
        #[source]
        source: std::io::Error,
    },

    /// Other listener I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Whether the error comes from the listen address itself.
    #[must_use]
    pub fn is_address_error(&self) -> bool {
        matches!(self, Self::InvalidAddress { .. } | Self::Bind { .. })
    }
}
