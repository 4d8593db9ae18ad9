//! WebSocket stream configuration.

use tungstenite::protocol::WebSocketConfig as ProtocolConfig;

/// Configuration for a duplex stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Capacity of the outbound message queue (default: 8).
    pub outgoing_capacity: usize,
    /// Capacity of the inbound message queue (default: 8).
    pub incoming_capacity: usize,
    /// Maximum inbound message size in bytes (default: 64 KiB).
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            outgoing_capacity: 8,
            incoming_capacity: 8,
            max_message_size: 64 * 1024,
        }
    }
}

impl WebSocketConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outbound queue capacity.
    pub fn outgoing_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_capacity = capacity;
        self
    }

    /// Set the inbound queue capacity.
    pub fn incoming_capacity(mut self, capacity: usize) -> Self {
        self.incoming_capacity = capacity;
        self
    }

    /// Set the maximum inbound message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    // Zero-capacity queues are not supported by tokio channels.
    pub(crate) fn outgoing_bound(&self) -> usize {
        self.outgoing_capacity.max(1)
    }

    pub(crate) fn incoming_bound(&self) -> usize {
        self.incoming_capacity.max(1)
    }

    pub(crate) fn protocol_config(&self) -> ProtocolConfig {
        let mut config = ProtocolConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}
