//! The push stream connection.
//!
//! An [`SseStream`] is opened from a request. The handler returns the
//! accompanying [`SseBody`] response, and events queued with
//! [`SseStream::send`] are encoded and written to it by one write loop.
//! The loop ends when the stream is closed, the request is cancelled or the
//! client goes away, even while no event is pending.

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::FutureExt;
use http::{header, HeaderValue, Response, StatusCode};
use hyper::body::{Body, Frame, SizeHint};
use meridian_core::{panic_message, Signal, StreamHandle, StreamId, StreamLifecycle, StreamListener};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::SseConfig;
use crate::error::{SseError, SseResult};
use crate::event::SseEvent;

/// Content type of an event stream.
pub const CONTENT_TYPE: &str = "text/event-stream";

struct Shared {
    lifecycle: StreamLifecycle,
    path: String,
    outgoing: mpsc::Sender<SseEvent>,
}

impl StreamHandle for Shared {
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

/// Response body of an event stream.
///
/// Yields encoded events until the stream closes.
#[derive(Debug)]
pub struct SseBody {
    rx: mpsc::Receiver<Bytes>,
}

impl Body for SseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(|b| Ok(Frame::data(b))))
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

/// A unidirectional server push stream.
///
/// Cloning yields another handle to the same stream.
#[derive(Clone)]
pub struct SseStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseStream")
            .field("id", &self.id())
            .field("path", &self.shared.path)
            .field("closed", &self.shared.lifecycle.closed().is_fired())
            .finish()
    }
}

impl SseStream {
    /// Opens a stream for a request to `path`.
    ///
    /// Returns the stream and the `200 OK` event-stream response. The
    /// stream also ends when `request_cancel` fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        path: impl Into<String>,
        config: &SseConfig,
        request_cancel: Signal,
    ) -> (Self, Response<SseBody>) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.outgoing_bound());
        // The body channel holds one chunk, so writes wait on the client.
        let (body_tx, body_rx) = mpsc::channel(1);

        let shared = Arc::new(Shared {
            lifecycle: StreamLifecycle::new(),
            path: path.into(),
            outgoing: outgoing_tx,
        });

        tokio::spawn(write_loop(
            Arc::clone(&shared),
            outgoing_rx,
            body_tx,
            request_cancel,
        ));

        let mut response = Response::new(SseBody { rx: body_rx });
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        (Self { shared }, response)
    }

    /// Stream identity.
    pub fn id(&self) -> StreamId {
        self.shared.lifecycle.id()
    }

    /// Queues a data-only event.
    ///
    /// Waits while the queue is full. Returns [`SseError::Cancelled`] if
    /// `cancel` fires first and [`SseError::Closed`] if the stream closed.
    pub async fn send(&self, cancel: &Signal, text: impl Into<String>) -> SseResult<()> {
        self.send_event(cancel, SseEvent::new(text)).await
    }

    /// Encodes `value` as JSON and queues it as a data-only event.
    pub async fn send_json<T: Serialize + ?Sized>(&self, cancel: &Signal, value: &T) -> SseResult<()> {
        self.send_event(cancel, SseEvent::json(value)?).await
    }

    /// Queues a full event.
    pub async fn send_event(&self, cancel: &Signal, event: SseEvent) -> SseResult<()> {
        if self.shared.lifecycle.close_requested().is_fired() {
            return Err(SseError::Closed);
        }

        tokio::select! {
            biased;
            () = cancel.wait() => Err(SseError::Cancelled),
            sent = self.shared.outgoing.send(event) => sent.map_err(|_| SseError::Closed),
        }
    }

    /// Requests closure and returns the closed confirmation.
    pub fn close(&self) -> Signal {
        self.shared.lifecycle.request_close()
    }

    /// Fires once the stream has fully closed.
    pub fn closed(&self) -> Signal {
        self.shared.lifecycle.closed()
    }

    /// Attaches a listener.
    pub fn add_listener(&self, listener: &Arc<dyn StreamListener>) {
        self.shared.lifecycle.add_listener(&self.handle(), listener);
    }

    /// Detaches a listener.
    pub fn remove_listener(&self, listener: &Arc<dyn StreamListener>) {
        self.shared.lifecycle.remove_listener(listener);
    }

    /// Type-erased handle used by listeners.
    pub fn handle(&self) -> Arc<dyn StreamHandle> {
        self.shared.clone()
    }
}

async fn write_loop(
    shared: Arc<Shared>,
    mut outgoing: mpsc::Receiver<SseEvent>,
    body: mpsc::Sender<Bytes>,
    request_cancel: Signal,
) {
    let id = shared.lifecycle.id();
    let closing = shared.lifecycle.close_requested();
    info!(stream_id = %id, path = %shared.path, "SSE");

    loop {
        let event = tokio::select! {
            () = closing.wait() => break,
            () = request_cancel.wait() => break,
            () = body.closed() => break,
            event = outgoing.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let write = async {
            let chunk = event.to_bytes();
            tokio::select! {
                sent = body.send(chunk) => sent.is_ok(),
                () = closing.wait() => false,
            }
        };
        match AssertUnwindSafe(write).catch_unwind().await {
            Ok(true) => {}
            Ok(false) => {
                debug!(stream_id = %id, "failed to write an SSE event");
                break;
            }
            Err(payload) => {
                let panic = panic_message(payload.as_ref());
                error!(stream_id = %id, panic = %panic, "panic in SSE write");
                break;
            }
        }
    }

    drop(body);
    let handle: Arc<dyn StreamHandle> = shared.clone();
    shared.lifecycle.finish(&handle);
    debug!(stream_id = %id, "SSE END");
}
