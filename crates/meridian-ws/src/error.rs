//! Error types for WebSocket operations.

use thiserror::Error;

/// Result type for WebSocket operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur during WebSocket operations.
#[derive(Debug, Error)]
pub enum WsError {
    /// The HTTP request was not a valid WebSocket upgrade request.
    #[error("not a WebSocket upgrade request: {reason}")]
    NotWebSocketRequest {
        /// Reason why the request is not a valid WebSocket upgrade.
        reason: String,
    },

    /// The transport could not be taken over after the handshake.
    #[error("WebSocket upgrade failed: {0}")]
    UpgradeFailed(String),

    /// The stream is closed and accepts no more messages.
    #[error("connection closed")]
    Closed,

    /// The caller's cancellation fired while waiting for queue space.
    #[error("send cancelled")]
    Cancelled,

    /// The message payload could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WsError {
    /// Create a new "not a WebSocket request" error.
    pub fn not_websocket(reason: impl Into<String>) -> Self {
        Self::NotWebSocketRequest {
            reason: reason.into(),
        }
    }

    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotWebSocketRequest { .. })
    }
}
