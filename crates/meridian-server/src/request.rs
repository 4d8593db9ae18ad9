//! The request passed to handlers and middleware.

use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderMap, Method, Request, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Limited};
use meridian_core::{HttpError, HttpResult, Signal, StreamListener};
use meridian_router::Params;
use meridian_sse::SseStream;
use meridian_ws::WebSocket;
use serde::de::DeserializeOwned;

use crate::response::{empty, HttpResponse, Resp};
use crate::router::RouterContext;

/// Body type of incoming requests.
///
/// Transport errors are carried as [`std::io::Error`].
pub type RequestBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Largest request body read by [`Req::body_bytes`] and friends.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// An empty request body.
pub fn empty_body() -> RequestBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// A routed request.
///
/// Wraps the HTTP request together with the captured path parameters, the
/// router's shared state and the request's cancellation signal.
pub struct Req {
    request: Request<RequestBody>,
    params: Params,
    context: Arc<RouterContext>,
    cancel: Signal,
}

impl std::fmt::Debug for Req {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Req")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Req {
    pub(crate) fn new(
        request: Request<RequestBody>,
        params: Params,
        context: Arc<RouterContext>,
        cancel: Signal,
    ) -> Self {
        Self {
            request,
            params,
            context,
            cancel,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    /// The URI path.
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// The underlying HTTP request.
    pub fn request(&self) -> &Request<RequestBody> {
        &self.request
    }

    /// Mutable access to the underlying HTTP request.
    pub fn request_mut(&mut self) -> &mut Request<RequestBody> {
        &mut self.request
    }

    /// Captured path parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// A path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// A path parameter as an integer, `0` if absent or malformed.
    pub fn int(&self, name: &str) -> isize {
        self.params.int(name)
    }

    /// A path parameter as an `i32`, `0` if absent or malformed.
    pub fn int32(&self, name: &str) -> i32 {
        self.params.int32(name)
    }

    /// A path parameter as an `i64`, `0` if absent or malformed.
    pub fn int64(&self, name: &str) -> i64 {
        self.params.int64(name)
    }

    /// Fires when the server stops. Blocking work should wait on it.
    pub fn cancellation(&self) -> Signal {
        self.cancel.clone()
    }

    /// Response helpers bound to the router.
    pub fn resp(&self) -> Resp {
        Resp::new(Arc::clone(&self.context.buffers))
    }

    /// Decoded URL query pairs, in order.
    pub fn query(&self) -> HttpResult<Vec<(String, String)>> {
        match self.uri().query() {
            Some(query) => serde_urlencoded::from_str(query).map_err(HttpError::bad_request),
            None => Ok(Vec::new()),
        }
    }

    /// Reads the whole body, up to [`MAX_BODY_SIZE`].
    ///
    /// The body can be read once; later calls return an empty buffer.
    pub async fn body_bytes(&mut self) -> HttpResult<Bytes> {
        let body = std::mem::replace(self.request.body_mut(), empty_body());
        let collected = Limited::new(body, MAX_BODY_SIZE)
            .collect()
            .await
            .map_err(HttpError::bad_request)?;
        Ok(collected.to_bytes())
    }

    /// Form values: the urlencoded body of a `POST`, `PUT` or `PATCH`
    /// followed by the URL query pairs.
    pub async fn form(&mut self) -> HttpResult<Vec<(String, String)>> {
        let mut values = Vec::new();

        let has_body = matches!(*self.method(), Method::POST | Method::PUT | Method::PATCH);
        let is_form = self
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(FORM_URLENCODED));
        if has_body && is_form {
            let body = self.body_bytes().await?;
            values = serde_urlencoded::from_bytes(&body).map_err(HttpError::bad_request)?;
        }

        values.extend(self.query()?);
        Ok(values)
    }

    /// Decodes a JSON body.
    ///
    /// Malformed input is a bad request, never an internal error.
    pub async fn decode_json<T: DeserializeOwned>(&mut self) -> HttpResult<T> {
        let body = self.body_bytes().await?;
        serde_json::from_slice(&body).map_err(HttpError::bad_request)
    }

    /// Upgrades to a duplex stream.
    ///
    /// Returns the stream, registered with the router for shutdown, and the
    /// `101` response the handler must return. A request that is not a
    /// valid upgrade is a bad request.
    pub fn websocket(&mut self) -> HttpResult<(WebSocket, HttpResponse)> {
        let (socket, response) = WebSocket::accept(&mut self.request, &self.context.websocket)
            .map_err(|err| {
                if err.is_client_error() {
                    HttpError::bad_request(err)
                } else {
                    HttpError::internal(err)
                }
            })?;

        socket.add_listener(&self.listener());
        Ok((socket, response.map(|()| empty())))
    }

    /// Opens a push stream.
    ///
    /// Returns the stream, registered with the router for shutdown, and the
    /// event-stream response the handler must return. The stream ends when
    /// the request is cancelled.
    pub fn sse(&self) -> (SseStream, HttpResponse) {
        let (stream, response) =
            SseStream::open(self.path(), &self.context.sse, self.cancel.clone());

        stream.add_listener(&self.listener());
        let response: HttpResponse =
            response.map(|body| body.map_err(|never| match never {}).boxed_unsync());
        (stream, response)
    }

    fn listener(&self) -> Arc<dyn StreamListener> {
        self.context.registry.clone()
    }

    #[cfg(test)]
    pub(crate) fn for_test(request: Request<RequestBody>) -> Self {
        Self::new(
            request,
            Params::new(),
            Arc::new(RouterContext::default()),
            Signal::new(),
        )
    }
}
