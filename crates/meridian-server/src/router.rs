//! Request dispatch.
//!
//! A [`Router`] owns the compiled route tree and the state shared by every
//! request: the stream registry, the encoding buffer pool and the stream
//! settings. Routes are registered before serving; dispatch only reads the
//! tree.
//!
//! ```text
//! request ─▶ match(method, path) ─▶ mw₁ ─▶ mw₂ ─▶ … ─▶ handler
//!                 │                                       │
//!                 └─ NotFound / MethodNotAllowed          └─ Result ─▶ response
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use http::{Method, Request, StatusCode};
use meridian_config::StreamsConfig;
use meridian_core::{panic_message, HttpError, HttpResult, Signal};
use meridian_router::{RouteResult, RouteTree, ANY};
use meridian_sse::SseConfig;
use meridian_ws::WebSocketConfig;
use tracing::{debug, error};

use crate::buffer::BufferPool;
use crate::handler::{Handler, Middleware, Next};
use crate::registry::ConnectionRegistry;
use crate::request::{Req, RequestBody};
use crate::response::{error_response, HttpResponse};
use crate::static_files::StaticFiles;

type Tree = RouteTree<Arc<dyn Handler>, Arc<dyn Middleware>>;

/// State shared by all requests of one router.
#[derive(Debug, Default)]
pub(crate) struct RouterContext {
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) buffers: Arc<BufferPool>,
    pub(crate) websocket: WebSocketConfig,
    pub(crate) sse: SseConfig,
}

/// Routes requests to handlers and tracks the streams they open.
///
/// # Example
///
/// ```rust,ignore
/// use meridian_server::{Req, Router};
///
/// let mut router = Router::new();
/// router
///     .get("/hello/:name", |req: Req| async move {
///         let name = req.param("name").unwrap_or("stranger").to_string();
///         Ok(req.resp().text(format!("Hello, {name}!")))
///     })?
///     .middleware("/", |req: Req, next: Next| async move { next.run(req).await })?;
/// ```
pub struct Router {
    tree: Tree,
    context: Arc<RouterContext>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.tree.route_count())
            .field("registry", &self.context.registry)
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a router with default stream settings.
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            context: Arc::new(RouterContext::default()),
        }
    }

    /// Applies stream queue settings to streams opened from now on.
    pub fn with_streams(mut self, streams: &StreamsConfig) -> Self {
        self.context = Arc::new(RouterContext {
            registry: Arc::clone(&self.context.registry),
            buffers: Arc::clone(&self.context.buffers),
            websocket: WebSocketConfig::new()
                .outgoing_capacity(streams.outgoing_capacity)
                .incoming_capacity(streams.incoming_capacity)
                .max_message_size(streams.max_message_size),
            sse: SseConfig::new().outgoing_capacity(streams.outgoing_capacity),
        });
        self
    }

    /// Number of registered handlers.
    pub fn route_count(&self) -> usize {
        self.tree.route_count()
    }

    /// Registers a handler for any method.
    pub fn any<F, Fut>(&mut self, path: &str, handler: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        self.handler(ANY, path, handler)
    }

    /// Registers a `HEAD` handler.
    pub fn head<F, Fut>(&mut self, path: &str, handler: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        self.handler("HEAD", path, handler)
    }

    /// Registers a `GET` handler.
    pub fn get<F, Fut>(&mut self, path: &str, handler: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        self.handler("GET", path, handler)
    }

    /// Registers a `POST` handler.
    pub fn post<F, Fut>(&mut self, path: &str, handler: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        self.handler("POST", path, handler)
    }

    /// Registers a `PUT` handler.
    pub fn put<F, Fut>(&mut self, path: &str, handler: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        self.handler("PUT", path, handler)
    }

    /// Registers a `DELETE` handler.
    pub fn delete<F, Fut>(&mut self, path: &str, handler: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        self.handler("DELETE", path, handler)
    }

    /// Registers a handler for `method`; [`ANY`] (`""`) means any method.
    pub fn handler<F, Fut>(&mut self, method: &str, path: &str, handler: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        self.route(method, path, Arc::new(handler))
    }

    /// Registers an already type-erased handler.
    pub fn route(
        &mut self,
        method: &str,
        path: &str,
        handler: Arc<dyn Handler>,
    ) -> RouteResult<&mut Self> {
        self.tree.handler(method, path, handler)?;
        Ok(self)
    }

    /// Adds middleware for every route at or below `path`.
    pub fn middleware<F, Fut>(&mut self, path: &str, middleware: F) -> RouteResult<&mut Self>
    where
        F: Fn(Req, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
    {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.tree.middleware(path, middleware)?;
        Ok(self)
    }

    /// Grafts the routes of `child` at `path`.
    ///
    /// Only the child's routes are kept; streams are always tracked by the
    /// router that serves them.
    pub fn add(&mut self, path: &str, child: Router) -> RouteResult<&mut Self> {
        self.tree.add(path, child.tree)?;
        Ok(self)
    }

    /// Serves files from `root` for `GET` and `HEAD` under `path`.
    ///
    /// A trailing catch-all segment is appended when `path` has none, so
    /// `"/static"` serves `/static/*`.
    pub fn static_files(&mut self, path: &str, root: impl Into<PathBuf>) -> RouteResult<&mut Self> {
        let pattern = if path.ends_with("/*") {
            path.to_string()
        } else {
            format!("{}/*", path.trim_end_matches('/'))
        };

        let files = StaticFiles::new(root).handler();
        self.route("GET", &pattern, Arc::clone(&files))?;
        self.route("HEAD", &pattern, files)
    }

    /// The registry of open streams.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.context.registry
    }

    /// Closes every open stream; the returned signal fires once all have
    /// closed. Streams opened later are closed on arrival.
    pub fn close(&self) -> Signal {
        self.context.registry.begin_shutdown()
    }

    /// Fires once [`close`](Self::close) has drained every stream.
    pub fn closed(&self) -> Signal {
        self.context.registry.drained()
    }

    /// Routes one request and returns the response.
    ///
    /// Never fails: routing errors, handler errors and handler panics all
    /// become error responses. `cancel` is the request's cancellation.
    pub async fn dispatch(&self, request: Request<RequestBody>, cancel: Signal) -> HttpResponse {
        let method = request.method().clone();
        let path = match urlencoding::decode(request.uri().path()) {
            Ok(path) => path.into_owned(),
            Err(err) => {
                let raw = request.uri().path();
                return respond_error(&method, raw, HttpError::bad_request(err));
            }
        };

        let found = match self.tree.match_route(method.as_str(), &path) {
            Ok(found) => found,
            Err(err) => return respond_error(&method, &path, err.into()),
        };

        let chain = found.middleware.into_iter().cloned().collect();
        let next = Next::new(chain, Arc::clone(found.handler));
        let req = Req::new(request, found.params, Arc::clone(&self.context), cancel);

        // The whole chain runs inside the guarded future, including the
        // synchronous part of each call.
        let outcome = AssertUnwindSafe(async move { next.run(req).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => respond_error(&method, &path, err),
            Err(payload) => {
                let panic = panic_message(payload.as_ref());
                error!(method = %method, path = %path, panic = %panic, "panic in handler");
                error_response("Internal server error", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn respond_error(method: &Method, path: &str, err: HttpError) -> HttpResponse {
    match &err {
        HttpError::NotFound | HttpError::MethodNotAllowed | HttpError::BadRequest(_) => {
            debug!(method = %method, path = %path, error = %err, "request failed");
        }
        HttpError::Internal(source) => {
            error!(method = %method, path = %path, error = %source, "internal server error");
        }
    }
    error_response(err.public_message(), err.status_code())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::header;
    use http_body_util::BodyExt;

    use super::*;
    use crate::request::empty_body;

    fn request(method: Method, uri: &str) -> Request<RequestBody> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(empty_body())
            .unwrap()
    }

    async fn call(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let response = router.dispatch(request(method, uri), Signal::new()).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn hello(req: Req) -> HttpResult<HttpResponse> {
        Ok(req.resp().text("hello"))
    }

    #[tokio::test]
    async fn test_dispatch_with_params() {
        let mut router = Router::new();
        router
            .get("/users/:id", |req: Req| async move {
                let id = req.int64("id");
                Ok(req.resp().text(format!("user {id}")))
            })
            .unwrap();

        assert_eq!(call(&router, Method::GET, "/users/42").await, (StatusCode::OK, "user 42".to_string()));
    }

    #[tokio::test]
    async fn test_params_are_percent_decoded() {
        let mut router = Router::new();
        router
            .get("/hello/:name", |req: Req| async move {
                let name = req.param("name").unwrap_or_default().to_string();
                Ok(req.resp().text(name))
            })
            .unwrap()
            .get("/caf\u{e9}", hello)
            .unwrap();

        assert_eq!(call(&router, Method::GET, "/hello/a%20b").await, (StatusCode::OK, "a b".to_string()));
        assert_eq!(call(&router, Method::GET, "/caf%C3%A9").await, (StatusCode::OK, "hello".to_string()));

        let (status, _) = call(&router, Method::GET, "/hello/%FF").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_handler_reads_body() {
        #[derive(serde::Deserialize)]
        struct Note {
            text: String,
        }

        let mut router = Router::new();
        router
            .post("/notes", |mut req: Req| async move {
                let note: Note = req.decode_json().await?;
                Ok(req.resp().text(note.text))
            })
            .unwrap()
            .put("/raw", |mut req: Req| async move {
                let bytes = req.body_bytes().await?;
                Ok(req.resp().text(format!("{} bytes", bytes.len())))
            })
            .unwrap();

        let body = |text: &'static str| {
            http_body_util::Full::new(bytes::Bytes::from_static(text.as_bytes()))
                .map_err(|never| match never {})
                .boxed_unsync()
        };
        let notes = Request::builder()
            .method(Method::POST)
            .uri("/notes")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body(r#"{"text":"remember"}"#))
            .unwrap();
        let response = router.dispatch(notes, Signal::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"remember");

        let raw = Request::builder()
            .method(Method::PUT)
            .uri("/raw")
            .body(body("12345"))
            .unwrap();
        let response = router.dispatch(raw, Signal::new()).await;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"5 bytes");
    }

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let mut router = Router::new();
        router.post("/submit", hello).unwrap();

        let (status, body) = call(&router, Method::GET, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found\n");

        let (status, body) = call(&router, Method::GET, "/submit").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "Method not allowed\n");
    }

    #[tokio::test]
    async fn test_middleware_onion_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();

        for (path, name) in [("/", "root"), ("/api", "api")] {
            let trace = Arc::clone(&trace);
            router
                .middleware(path, move |req: Req, next: Next| {
                    let trace = Arc::clone(&trace);
                    async move {
                        trace.lock().unwrap().push(format!("{name} before"));
                        let response = next.run(req).await;
                        trace.lock().unwrap().push(format!("{name} after"));
                        response
                    }
                })
                .unwrap();
        }
        {
            let trace = Arc::clone(&trace);
            router
                .get("/api/items", move |req: Req| {
                    trace.lock().unwrap().push("handler".to_string());
                    async move { Ok(req.resp().text("items")) }
                })
                .unwrap();
        }

        let (status, _) = call(&router, Method::GET, "/api/items").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["root before", "api before", "handler", "api after", "root after"]
        );
    }

    #[tokio::test]
    async fn test_middleware_short_circuit() {
        let mut router = Router::new();
        router
            .middleware("/admin", |req: Req, _next: Next| async move {
                Ok(req.resp().error("Forbidden", StatusCode::FORBIDDEN))
            })
            .unwrap()
            .get("/admin/panel", |_req: Req| async move {
                Err::<HttpResponse, _>(HttpError::internal(std::io::Error::other("unreachable")))
            })
            .unwrap();

        let (status, body) = call(&router, Method::GET, "/admin/panel").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Forbidden\n");
    }

    #[tokio::test]
    async fn test_error_classification() {
        let mut router = Router::new();
        router
            .get("/bad", |_req: Req| async move { Err(HttpError::bad_request("missing id")) })
            .unwrap()
            .get("/broken", |_req: Req| async move {
                Err(HttpError::internal(std::io::Error::other("disk on fire")))
            })
            .unwrap();

        assert_eq!(
            call(&router, Method::GET, "/bad").await,
            (StatusCode::BAD_REQUEST, "Bad request: missing id\n".to_string())
        );
        // Internal details stay in the log.
        assert_eq!(
            call(&router, Method::GET, "/broken").await,
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let mut router = Router::new();
        router
            .get("/panic", |_req: Req| async move {
                if true {
                    panic!("handler exploded");
                }
                Ok(crate::response::error_response("", StatusCode::OK))
            })
            .unwrap()
            .get("/sync-panic", |_req: Req| -> std::future::Ready<HttpResult<HttpResponse>> {
                panic!("before the future");
            })
            .unwrap()
            .get("/ok", hello)
            .unwrap();

        let (status, _) = call(&router, Method::GET, "/panic").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let (status, _) = call(&router, Method::GET, "/sync-panic").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(call(&router, Method::GET, "/ok").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_any_method_and_subtree() {
        let mut api = Router::new();
        api.any("/echo", |req: Req| async move {
            let method = req.method().to_string();
            Ok(req.resp().text(method))
        })
        .unwrap();
        api.get("/", hello).unwrap();

        let mut router = Router::new();
        router.add("/api", api).unwrap();
        assert_eq!(router.route_count(), 2);

        assert_eq!(call(&router, Method::PUT, "/api/echo").await.1, "PUT");
        assert_eq!(call(&router, Method::GET, "/api").await.1, "hello");
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = Router::new();
        router.get("/a", hello).unwrap();
        assert!(router.get("/a", hello).is_err());
        assert!(router.any("/a", hello).is_err());
    }

    #[tokio::test]
    async fn test_json_response() {
        let mut router = Router::new();
        router
            .get("/status", |req: Req| async move {
                req.resp().json(&serde_json::json!({"healthy": true}))
            })
            .unwrap();

        let response = router.dispatch(request(Method::GET, "/status"), Signal::new()).await;
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_close_without_streams() {
        let router = Router::new();
        assert!(router.close().is_fired());
        assert!(router.closed().is_fired());
        assert!(router.registry().is_closing());
    }
}
