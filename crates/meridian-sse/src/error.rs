//! Error types for Server-Sent Events operations.

use thiserror::Error;

/// Result type for SSE operations.
pub type SseResult<T> = Result<T, SseError>;

/// Errors that can occur during SSE operations.
#[derive(Debug, Error)]
pub enum SseError {
    /// The stream is closed and accepts no more events.
    #[error("stream closed")]
    Closed,

    /// The caller's cancellation fired while waiting for queue space.
    #[error("send cancelled")]
    Cancelled,

    /// Failed to serialize event data.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SseError {
    /// Returns true if the stream had already closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
