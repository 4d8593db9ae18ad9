//! Long-lived stream contracts.
//!
//! Duplex (WebSocket) and push (SSE) streams share one lifecycle:
//!
//! ```text
//! Open ──close()──▶ Closing ──tasks exit──▶ Closed
//! ```
//!
//! A close request is idempotent and coalescing; the closed confirmation
//! fires exactly once. Listeners such as the server's connection registry
//! are notified when a stream opens and when it closes.
//!
//! Streams and listeners only hold [`Weak`] references to each other, so
//! neither keeps the other alive.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::signal::Signal;

/// A unique identifier for a stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Creates a new time-ordered stream ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The control surface every stream exposes to listeners.
pub trait StreamHandle: Send + Sync + 'static {
    /// Stream identity.
    fn id(&self) -> StreamId;

    /// Requests the stream to close and returns its closed confirmation.
    fn close(&self) -> Signal;

    /// The closed confirmation.
    fn closed(&self) -> Signal;
}

/// Receives stream open/close notifications.
pub trait StreamListener: Send + Sync + 'static {
    /// Called once the listener is attached to an open stream.
    fn on_opened(&self, stream: &Arc<dyn StreamHandle>);

    /// Called when the stream has closed.
    fn on_closed(&self, stream: &Arc<dyn StreamHandle>);
}

/// Lifecycle state shared by both stream kinds.
///
/// Holds the close request, the closed confirmation and the listener set.
/// The stream implementation owns one of these and calls
/// [`StreamLifecycle::finish`] from its outbound task on exit.
#[derive(Debug)]
pub struct StreamLifecycle {
    id: StreamId,
    close_requested: Signal,
    closed: Signal,
    listeners: Mutex<Vec<Weak<dyn StreamListener>>>,
}

impl Default for StreamLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamLifecycle {
    /// Creates the lifecycle of a freshly opened stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: StreamId::new(),
            close_requested: Signal::new(),
            closed: Signal::new(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Stream identity.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Requests closure; repeated requests coalesce into the first.
    pub fn request_close(&self) -> Signal {
        self.close_requested.fire();
        self.closed.clone()
    }

    /// Fires when closure has been requested by either side.
    #[must_use]
    pub fn close_requested(&self) -> &Signal {
        &self.close_requested
    }

    /// Fires once the stream has fully closed.
    #[must_use]
    pub fn closed(&self) -> Signal {
        self.closed.clone()
    }

    /// Attaches `listener` and tells it about the current state.
    ///
    /// Listeners are deduplicated by identity. A listener attached after
    /// closure receives `on_closed` instead of `on_opened`.
    pub fn add_listener(&self, stream: &Arc<dyn StreamHandle>, listener: &Arc<dyn StreamListener>) {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same_listener(l, listener)) {
            return;
        }
        listeners.push(Arc::downgrade(listener));

        if self.closed.is_fired() {
            listener.on_closed(stream);
        } else {
            listener.on_opened(stream);
        }
    }

    /// Detaches `listener`; it receives no further notifications.
    pub fn remove_listener(&self, listener: &Arc<dyn StreamListener>) {
        self.listeners
            .lock()
            .retain(|l| !same_listener(l, listener) && l.strong_count() > 0);
    }

    /// Number of attached listeners that are still alive.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    /// Marks the stream closed and notifies listeners.
    ///
    /// Only the first call has any effect.
    pub fn finish(&self, stream: &Arc<dyn StreamHandle>) {
        self.close_requested.fire();

        // Fired under the lock so a concurrent add_listener sees exactly one
        // of on_opened + on_closed or on_closed alone.
        let listeners: Vec<_> = {
            let listeners = self.listeners.lock();
            if !self.closed.fire() {
                return;
            }
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_closed(stream);
        }
    }
}

fn same_listener(weak: &Weak<dyn StreamListener>, strong: &Arc<dyn StreamListener>) -> bool {
    std::ptr::eq(weak.as_ptr().cast::<()>(), Arc::as_ptr(strong).cast::<()>())
}
