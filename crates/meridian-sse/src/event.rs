//! SSE event encoding.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::error::SseResult;

/// A Server-Sent Event.
///
/// # Example
///
/// ```
/// use meridian_sse::SseEvent;
///
/// let event = SseEvent::new("Hello, World!")
///     .id("1")
///     .event("greeting");
///
/// assert_eq!(
///     event.to_sse_string(),
///     "id: 1\nevent: greeting\ndata: Hello, World!\n\n"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    id: Option<String>,
    event: Option<String>,
    data: String,
    retry: Option<Duration>,
}

impl SseEvent {
    /// Create a new SSE event with the given data.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Create an SSE event from a JSON-serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> SseResult<Self> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    /// Set the event ID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the event type.
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the reconnection hint.
    pub fn retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Get the event data.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Format the event as an SSE text block.
    ///
    /// Every data line gets its own `data:` field; the block ends with a
    /// blank line.
    pub fn to_sse_string(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 16);

        if let Some(id) = &self.id {
            let _ = writeln!(out, "id: {}", single_line(id));
        }
        if let Some(event) = &self.event {
            let _ = writeln!(out, "event: {}", single_line(event));
        }
        if let Some(retry) = self.retry {
            let _ = writeln!(out, "retry: {}", retry.as_millis());
        }

        for line in self.data.split('\n') {
            let _ = writeln!(out, "data: {}", line.strip_suffix('\r').unwrap_or(line));
        }

        out.push('\n');
        out
    }

    /// Convert to bytes for sending.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_sse_string())
    }
}

// Field values other than data cannot span lines.
fn single_line(value: &str) -> &str {
    value.split(['\r', '\n']).next().unwrap_or_default()
}

impl From<String> for SseEvent {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&str> for SseEvent {
    fn from(data: &str) -> Self {
        Self::new(data)
    }
}
