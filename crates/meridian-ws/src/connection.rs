//! The duplex stream connection.
//!
//! A [`WebSocket`] owns its transport through one driver task. The driver
//! waits for the transport (the HTTP upgrade completes after the `101`
//! response has been written), then runs the outbound write loop while a
//! second task reads inbound messages.
//!
//! ```text
//!  send() ──▶ [outgoing queue] ──▶ write loop ──▶ transport
//!  recv() ◀── [incoming queue] ◀── read loop  ◀── transport
//! ```
//!
//! Sends block while the outbound queue is full, until space frees or the
//! caller's cancellation fires. Inbound messages are dropped rather than
//! queued once the stream is closing.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, Stream, StreamExt};
use http::{Request, Response};
use hyper_util::rt::TokioIo;
use meridian_core::{panic_message, Signal, StreamHandle, StreamId, StreamLifecycle, StreamListener};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info};
use tungstenite::protocol::Role;
use tungstenite::Message;

use crate::config::WebSocketConfig;
use crate::error::{WsError, WsResult};
use crate::upgrade::{upgrade_response, validate_upgrade_request};

/// How long the write loop waits for the close handshake to flush.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

struct Shared {
    lifecycle: StreamLifecycle,
    path: String,
    outgoing: mpsc::Sender<Message>,
    incoming: Mutex<mpsc::Receiver<Message>>,
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

/// A duplex message stream over an upgraded connection.
///
/// Cloning yields another handle to the same stream.
#[derive(Clone)]
pub struct WebSocket {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("id", &self.id())
            .field("path", &self.shared.path)
            .field("closed", &self.shared.lifecycle.closed().is_fired())
            .finish()
    }
}

impl WebSocket {
    /// Accepts an upgrade request.
    ///
    /// Returns the stream together with the `101 Switching Protocols`
    /// response the handler must send. The stream starts exchanging
    /// messages once the server hands over the upgraded connection; if the
    /// hand-over fails, the stream closes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn accept<B>(
        request: &mut Request<B>,
        config: &WebSocketConfig,
    ) -> WsResult<(Self, Response<()>)> {
        let accept_key = validate_upgrade_request(request)?;
        let response = upgrade_response(&accept_key)?;

        let path = request.uri().path().to_string();
        let on_upgrade = hyper::upgrade::on(request);
        let socket = Self::spawn(path, config, async move {
            let upgraded = on_upgrade
                .await
                .map_err(|e| WsError::UpgradeFailed(e.to_string()))?;
            Ok(TokioIo::new(upgraded))
        });

        Ok((socket, response))
    }

    /// Runs a server-side stream over an already upgraded transport.
    pub fn from_io<S>(io: S, config: &WebSocketConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn(String::new(), config, async move { Ok(io) })
    }

    pub(crate) fn spawn<S, F>(path: String, config: &WebSocketConfig, io: F) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = WsResult<S>> + Send + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.outgoing_bound());
        let (incoming_tx, incoming_rx) = mpsc::channel(config.incoming_bound());

        let shared = Arc::new(Shared {
            lifecycle: StreamLifecycle::new(),
            path,
            outgoing: outgoing_tx,
            incoming: Mutex::new(incoming_rx),
        });

        tokio::spawn(drive(
            Arc::clone(&shared),
            io,
            config.clone(),
            outgoing_rx,
            incoming_tx,
        ));

        Self { shared }
    }

    /// Stream identity.
    pub fn id(&self) -> StreamId {
        self.shared.lifecycle.id()
    }

    /// Request path the stream was opened on.
    pub fn path(&self) -> &str {
        &self.shared.path
    }

    /// Queues a text message.
    ///
    /// Waits while the outbound queue is full. Returns
    /// [`WsError::Cancelled`] if `cancel` fires first and
    /// [`WsError::Closed`] if the stream has closed.
    pub async fn send(&self, cancel: &Signal, text: impl Into<String>) -> WsResult<()> {
        self.send_message(cancel, Message::text(text.into())).await
    }

    /// Encodes `value` as JSON and queues it as a text message.
    pub async fn send_json<T: Serialize + ?Sized>(&self, cancel: &Signal, value: &T) -> WsResult<()> {
        let text = serde_json::to_string(value)?;
        self.send(cancel, text).await
    }

    /// Queues a binary message.
    pub async fn send_binary(&self, cancel: &Signal, data: impl Into<Vec<u8>>) -> WsResult<()> {
        self.send_message(cancel, Message::binary(data.into())).await
    }

    async fn send_message(&self, cancel: &Signal, message: Message) -> WsResult<()> {
        if self.shared.lifecycle.close_requested().is_fired() {
            return Err(WsError::Closed);
        }

        tokio::select! {
            biased;
            () = cancel.wait() => Err(WsError::Cancelled),
            sent = self.shared.outgoing.send(message) => sent.map_err(|_| WsError::Closed),
        }
    }

    /// Receives the next inbound text or binary message.
    ///
    /// Returns `None` once the stream has closed and the queue is drained.
    pub async fn recv(&self) -> Option<Message> {
        self.shared.incoming.lock().await.recv().await
    }

    /// Requests closure and returns the closed confirmation.
    pub fn close(&self) -> Signal {
        self.shared.lifecycle.request_close()
    }

    /// Fires once the stream has fully closed.
    pub fn closed(&self) -> Signal {
        self.shared.lifecycle.closed()
    }

    /// Attaches a listener; see [`StreamLifecycle::add_listener`].
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

async fn drive<S, F>(
    shared: Arc<Shared>,
    io: F,
    config: WebSocketConfig,
    outgoing: mpsc::Receiver<Message>,
    incoming: mpsc::Sender<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = WsResult<S>> + Send + 'static,
{
    let id = shared.lifecycle.id();
    let handle: Arc<dyn StreamHandle> = shared.clone();

    let io = tokio::select! {
        io = io => io,
        () = shared.lifecycle.close_requested().wait() => {
            debug!(stream_id = %id, "websocket closed before upgrade");
            shared.lifecycle.finish(&handle);
            return;
        }
    };

    let io = match io {
        Ok(io) => io,
        Err(e) => {
            debug!(stream_id = %id, error = %e, "websocket upgrade failed");
            shared.lifecycle.finish(&handle);
            return;
        }
    };

    let socket =
        WebSocketStream::from_raw_socket(io, Role::Server, Some(config.protocol_config())).await;
    info!(stream_id = %id, path = %shared.path, "WS");

    let (sink, stream) = socket.split();
    tokio::spawn(read_loop(Arc::clone(&shared), stream, incoming));
    write_loop(&shared, sink, outgoing).await;

    shared.lifecycle.finish(&handle);
    debug!(stream_id = %id, "WS END");
}

async fn write_loop<S>(
    shared: &Shared,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outgoing: mpsc::Receiver<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = shared.lifecycle.id();
    loop {
        let message = tokio::select! {
            () = shared.lifecycle.close_requested().wait() => break,
            message = outgoing.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let len = message.len();
        match AssertUnwindSafe(sink.send(message)).catch_unwind().await {
            Ok(Ok(())) => debug!(stream_id = %id, len, "websocket sent a message"),
            Ok(Err(e)) => {
                debug!(stream_id = %id, error = %e, "websocket failed to send a message");
                break;
            }
            Err(payload) => {
                let panic = panic_message(payload.as_ref());
                error!(stream_id = %id, panic = %panic, "panic in websocket write");
                break;
            }
        }
    }

    if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.close())
        .await
        .is_err()
    {
        debug!(stream_id = %id, "websocket close handshake timed out");
    }
}

async fn read_loop<R>(shared: Arc<Shared>, stream: R, incoming: mpsc::Sender<Message>)
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let id = shared.lifecycle.id();
    if let Err(payload) = AssertUnwindSafe(read_messages(&shared, stream, &incoming))
        .catch_unwind()
        .await
    {
        let panic = panic_message(payload.as_ref());
        error!(stream_id = %id, panic = %panic, "panic in websocket read");
    }
    shared.lifecycle.request_close();
}

async fn read_messages<R>(shared: &Shared, mut stream: R, incoming: &mpsc::Sender<Message>)
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let id = shared.lifecycle.id();
    let closing = shared.lifecycle.close_requested();

    loop {
        let next = tokio::select! {
            () = closing.wait() => break,
            next = stream.next() => next,
        };

        let message = match next {
            Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => message,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(stream_id = %id, error = %e, "websocket read failed");
                break;
            }
        };
        debug!(stream_id = %id, len = message.len(), "websocket incoming message");

        tokio::select! {
            () = closing.wait() => {
                debug!(stream_id = %id, "dropping inbound message, stream is closing");
                break;
            }
            sent = incoming.send(message) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Serialize;
    use tokio::io::DuplexStream;
    use tokio::sync::oneshot;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    async fn pair(config: &WebSocketConfig) -> (WebSocket, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocket::from_io(server_io, config);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (server, client)
    }

    async fn within<T>(future: impl Future<Output = T>) -> T {
        tokio::time::timeout(WAIT, future).await.expect("timed out")
    }

    #[derive(Default)]
    struct Counter {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl StreamListener for Counter {
        fn on_opened(&self, _stream: &Arc<dyn StreamHandle>) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn on_closed(&self, _stream: &Arc<dyn StreamHandle>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_exchange_messages() {
        let (server, mut client) = pair(&WebSocketConfig::default()).await;
        let cancel = Signal::new();

        client.send(Message::text("ping")).await.unwrap();
        let inbound = within(server.recv()).await.unwrap();
        assert_eq!(inbound.to_text().unwrap(), "ping");

        server.send(&cancel, "pong").await.unwrap();
        let outbound = within(client.next()).await.unwrap().unwrap();
        assert_eq!(outbound.to_text().unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_outbound_order_preserved() {
        let (server, mut client) = pair(&WebSocketConfig::default()).await;
        let cancel = Signal::new();

        for i in 0..20 {
            server.send(&cancel, format!("m{i}")).await.unwrap();
        }
        for i in 0..20 {
            let message = within(client.next()).await.unwrap().unwrap();
            assert_eq!(message.to_text().unwrap(), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn test_send_json() {
        #[derive(Serialize)]
        struct Greeting<'a> {
            hello: &'a str,
        }

        let (server, mut client) = pair(&WebSocketConfig::default()).await;
        server
            .send_json(&Signal::new(), &Greeting { hello: "world" })
            .await
            .unwrap();

        let message = within(client.next()).await.unwrap().unwrap();
        assert_eq!(message.to_text().unwrap(), r#"{"hello":"world"}"#);
    }

    #[tokio::test]
    async fn test_server_close() {
        let (server, mut client) = pair(&WebSocketConfig::default()).await;

        within(server.close().wait()).await;
        assert!(within(server.recv()).await.is_none());

        // The peer sees the close frame, then the end of the stream.
        loop {
            match within(client.next()).await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }

        let err = server.send(&Signal::new(), "late").await.unwrap_err();
        assert!(matches!(err, WsError::Closed));
    }

    #[tokio::test]
    async fn test_peer_disconnect_closes_stream() {
        let (server, client) = pair(&WebSocketConfig::default()).await;
        drop(client);
        within(server.closed().wait()).await;
    }

    #[tokio::test]
    async fn test_close_coalesces() {
        let (server, _client) = pair(&WebSocketConfig::default()).await;
        let first = server.close();
        let second = server.close();
        assert!(first.same(&second));
        within(first.wait()).await;
    }

    #[tokio::test]
    async fn test_send_blocks_when_queue_full_until_cancelled() {
        let config = WebSocketConfig::new().outgoing_capacity(2);
        let server = WebSocket::spawn(
            String::new(),
            &config,
            std::future::pending::<WsResult<DuplexStream>>(),
        );
        let cancel = Signal::new();

        server.send(&cancel, "one").await.unwrap();
        server.send(&cancel, "two").await.unwrap();

        let blocked = {
            let server = server.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { server.send(&cancel, "three").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        cancel.fire();
        let result = within(blocked).await.unwrap();
        assert!(matches!(result, Err(WsError::Cancelled)));

        within(server.close().wait()).await;
    }

    #[tokio::test]
    async fn test_blocked_send_completes_when_space_frees() {
        let config = WebSocketConfig::new().outgoing_capacity(1);
        let (io_tx, io_rx) = oneshot::channel::<DuplexStream>();
        let server = WebSocket::spawn(String::new(), &config, async move {
            io_rx.await.map_err(|e| WsError::UpgradeFailed(e.to_string()))
        });
        let cancel = Signal::new();

        server.send(&cancel, "first").await.unwrap();
        let blocked = {
            let server = server.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { server.send(&cancel, "second").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        io_tx.send(server_io).unwrap();
        within(blocked).await.unwrap().unwrap();

        let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        for expected in ["first", "second"] {
            let message = within(client.next()).await.unwrap().unwrap();
            assert_eq!(message.to_text().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_failed_upgrade_closes_stream() {
        let counter = Arc::new(Counter::default());
        let listener: Arc<dyn StreamListener> = counter.clone();

        let server = WebSocket::spawn(String::new(), &WebSocketConfig::default(), async {
            Err::<DuplexStream, _>(WsError::UpgradeFailed("connection reset".into()))
        });
        server.add_listener(&listener);

        within(server.closed().wait()).await;
        assert_eq!(counter.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counter.closed.load(Ordering::SeqCst), 1);
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_listener_notified_once() {
        let (server, _client) = pair(&WebSocketConfig::default()).await;
        let counter = Arc::new(Counter::default());
        let listener: Arc<dyn StreamListener> = counter.clone();

        server.add_listener(&listener);
        server.add_listener(&listener);
        assert_eq!(counter.opened.load(Ordering::SeqCst), 1);

        within(server.close().wait()).await;
        assert_eq!(counter.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accept_without_transport_upgrade() {
        let mut request = Request::builder()
            .uri("/ws")
            .header(http::header::CONNECTION, "Upgrade")
            .header(http::header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .unwrap();

        let (socket, response) =
            WebSocket::accept(&mut request, &WebSocketConfig::default()).unwrap();
        assert_eq!(response.status(), http::StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(socket.path(), "/ws");

        // No server connection to take over, so the stream closes.
        within(socket.closed().wait()).await;
    }

    #[tokio::test]
    async fn test_accept_rejects_plain_request() {
        let mut request = Request::builder().uri("/ws").body(()).unwrap();
        let err = WebSocket::accept(&mut request, &WebSocketConfig::default()).unwrap_err();
        assert!(err.is_client_error());
    }

    // Shared state with no transport attached.
    fn detached_shared() -> Arc<Shared> {
        let (outgoing, _) = mpsc::channel(1);
        let (_, incoming) = mpsc::channel(1);
        Arc::new(Shared {
            lifecycle: StreamLifecycle::new(),
            path: "/ws".to_string(),
            outgoing,
            incoming: Mutex::new(incoming),
        })
    }

    #[tokio::test]
    async fn test_read_loop_forwards_then_requests_close() {
        let shared = detached_shared();
        let (incoming_tx, mut incoming_rx) = mpsc::channel(4);
        let transport = futures_util::stream::iter(vec![
            Ok(Message::text("one")),
            Ok(Message::Ping(Vec::new().into())),
            Ok(Message::binary(vec![2u8])),
        ]);

        within(read_loop(Arc::clone(&shared), transport, incoming_tx)).await;
        assert_eq!(incoming_rx.recv().await.unwrap().to_text().unwrap(), "one");
        assert_eq!(incoming_rx.recv().await.unwrap().into_data().as_ref(), &[2u8]);
        assert!(shared.lifecycle.close_requested().is_fired());
    }

    #[tokio::test]
    async fn test_read_loop_panic_requests_close() {
        let shared = detached_shared();
        let (incoming_tx, _incoming_rx) = mpsc::channel(4);
        let transport = futures_util::stream::poll_fn(
            |_cx| -> std::task::Poll<Option<Result<Message, tungstenite::Error>>> {
                panic!("frame decoder failed")
            },
        );

        within(read_loop(Arc::clone(&shared), transport, incoming_tx)).await;
        assert!(shared.lifecycle.close_requested().is_fired());
    }
}
