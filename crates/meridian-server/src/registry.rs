//! Tracking of open streams for graceful shutdown.
//!
//! The registry is attached as a listener to every stream opened through
//! the router. It holds only weak references, so a stream's lifetime stays
//! with its own tasks. On shutdown it asks every tracked stream to close
//! and fires its drained signal once all of them confirm.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use meridian_core::{Signal, StreamHandle, StreamId, StreamListener};
use parking_lot::Mutex;
use tracing::debug;

#[derive(Default)]
struct State {
    closing: bool,
    streams: HashMap<StreamId, Weak<dyn StreamHandle>>,
}

/// The set of currently open streams.
pub struct ConnectionRegistry {
    state: Mutex<State>,
    drained: Signal,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionRegistry")
            .field("closing", &state.closing)
            .field("tracked", &state.streams.len())
            .field("drained", &self.drained.is_fired())
            .finish()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            drained: Signal::new(),
        }
    }

    /// Number of tracked streams.
    pub fn len(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Returns true if no stream is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tracked streams that have not yet confirmed closure.
    ///
    /// Unlike [`len`](Self::len), this drops to zero once a drain completes,
    /// since the tracked set is frozen while closing.
    pub fn open_streams(&self) -> usize {
        self.state
            .lock()
            .streams
            .values()
            .filter_map(Weak::upgrade)
            .filter(|stream| !stream.closed().is_fired())
            .count()
    }

    /// Returns true if the stream is tracked.
    pub fn contains(&self, id: StreamId) -> bool {
        self.state.lock().streams.contains_key(&id)
    }

    /// Returns true once shutdown has begun.
    pub fn is_closing(&self) -> bool {
        self.state.lock().closing
    }

    /// Fires when shutdown has finished draining.
    pub fn drained(&self) -> Signal {
        self.drained.clone()
    }

    /// Closes every tracked stream and returns the drained signal.
    ///
    /// Only the first call starts the drain; later calls return the same
    /// signal. Streams opened afterwards are closed on arrival and never
    /// tracked. Must be called from within a Tokio runtime when streams
    /// are open.
    pub fn begin_shutdown(&self) -> Signal {
        let streams: Vec<Arc<dyn StreamHandle>> = {
            let mut state = self.state.lock();
            if state.closing {
                return self.drained.clone();
            }
            state.closing = true;
            // Left in place: on_closed no longer mutates the set.
            state.streams.values().filter_map(Weak::upgrade).collect()
        };

        debug!(streams = streams.len(), "closing open streams");
        if streams.is_empty() {
            self.drained.fire();
            return self.drained.clone();
        }

        let closed: Vec<Signal> = streams.iter().map(|stream| stream.close()).collect();
        let drained = self.drained.clone();
        tokio::spawn(async move {
            join_all(closed.iter().map(Signal::wait)).await;
            debug!("all streams closed");
            drained.fire();
        });

        self.drained.clone()
    }
}

impl StreamListener for ConnectionRegistry {
    fn on_opened(&self, stream: &Arc<dyn StreamHandle>) {
        let mut state = self.state.lock();
        if state.closing {
            drop(state);
            stream.close();
            return;
        }
        state.streams.insert(stream.id(), Arc::downgrade(stream));
    }

    fn on_closed(&self, stream: &Arc<dyn StreamHandle>) {
        let mut state = self.state.lock();
        if state.closing {
            return;
        }
        state.streams.remove(&stream.id());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use meridian_core::StreamLifecycle;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    struct FakeStream {
        lifecycle: StreamLifecycle,
    }

    impl StreamHandle for FakeStream {
        fn id(&self) -> StreamId {
            self.lifecycle.id()
        }

        fn close(&self) -> Signal {
            self.lifecycle.request_close()
        }

        fn closed(&self) -> Signal {
            self.lifecycle.closed()
        }
    }

    fn open(registry: &Arc<ConnectionRegistry>) -> (Arc<FakeStream>, Arc<dyn StreamHandle>) {
        let stream = Arc::new(FakeStream {
            lifecycle: StreamLifecycle::new(),
        });
        let handle: Arc<dyn StreamHandle> = stream.clone();
        let listener: Arc<dyn StreamListener> = registry.clone();
        stream.lifecycle.add_listener(&handle, &listener);
        (stream, handle)
    }

    fn confirm_closed(stream: &FakeStream, handle: &Arc<dyn StreamHandle>) {
        stream.lifecycle.finish(handle);
    }

    #[tokio::test]
    async fn test_open_and_close_tracking() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (a, a_handle) = open(&registry);
        let (_b, _b_handle) = open(&registry);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a.id()));

        confirm_closed(&a, &a_handle);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(a.id()));
    }

    #[tokio::test]
    async fn test_shutdown_drains_all_streams() {
        let registry = Arc::new(ConnectionRegistry::new());
        let streams: Vec<_> = (0..3).map(|_| open(&registry)).collect();
        assert_eq!(registry.len(), 3);

        let drained = registry.begin_shutdown();
        for (stream, _) in &streams {
            assert!(stream.lifecycle.close_requested().is_fired());
        }

        confirm_closed(&streams[0].0, &streams[0].1);
        confirm_closed(&streams[1].0, &streams[1].1);
        tokio::task::yield_now().await;
        assert!(tokio::time::timeout(Duration::from_millis(50), drained.wait())
            .await
            .is_err());

        assert_eq!(registry.open_streams(), 1);
        confirm_closed(&streams[2].0, &streams[2].1);
        tokio::time::timeout(WAIT, drained.wait())
            .await
            .expect("registry did not drain");
        assert_eq!(registry.open_streams(), 0);

        let (late, _late_handle) = open(&registry);
        assert!(late.lifecycle.close_requested().is_fired());
        assert!(!registry.contains(late.id()));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_idempotent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (stream, handle) = open(&registry);

        let first = registry.begin_shutdown();
        let second = registry.begin_shutdown();
        assert!(first.same(&second));
        assert!(registry.is_closing());

        confirm_closed(&stream, &handle);
        tokio::time::timeout(WAIT, first.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_streams_drains_immediately() {
        let registry = ConnectionRegistry::new();
        assert!(registry.begin_shutdown().is_fired());
    }

    #[tokio::test]
    async fn test_stream_closing_itself_during_shutdown() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (stream, handle) = open(&registry);

        // The stream finishes on its own while the drain is starting.
        let closer = {
            let stream = stream.clone();
            let handle = handle.clone();
            tokio::spawn(async move { confirm_closed(&stream, &handle) })
        };
        let drained = registry.begin_shutdown();
        closer.await.unwrap();

        tokio::time::timeout(WAIT, drained.wait()).await.unwrap();
        assert!(stream.lifecycle.closed().is_fired());
    }
}
