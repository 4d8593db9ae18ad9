//! SSE stream configuration.

/// Configuration for a push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseConfig {
    /// Capacity of the outbound event queue (default: 8).
    pub outgoing_capacity: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            outgoing_capacity: 8,
        }
    }
}

impl SseConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outbound queue capacity.
    pub fn outgoing_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_capacity = capacity;
        self
    }

    pub(crate) fn outgoing_bound(&self) -> usize {
        self.outgoing_capacity.max(1)
    }
}
