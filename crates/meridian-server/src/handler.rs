//! Handler and middleware contracts.
//!
//! A handler turns a [`Req`] into a response. Middleware wraps the rest of
//! the chain: it receives the request and a [`Next`] continuation, and may
//! call it, change the request first, rewrite the response after, or answer
//! on its own without calling it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use meridian_core::HttpResult;

use crate::request::Req;
use crate::response::HttpResponse;

/// Boxed future returned by handlers and middleware.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Responds to a request.
///
/// Implemented for every `Fn(Req) -> impl Future<Output = HttpResult<HttpResponse>>`,
/// so plain async closures and functions work:
///
/// ```rust,ignore
/// async fn hello(req: Req) -> HttpResult<HttpResponse> {
///     Ok(req.resp().text("hello"))
/// }
/// router.get("/hello", hello)?;
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles the request.
    fn call(&self, req: Req) -> BoxFuture<HttpResult<HttpResponse>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
{
    fn call(&self, req: Req) -> BoxFuture<HttpResult<HttpResponse>> {
        Box::pin(self(req))
    }
}

/// Wraps the remainder of a handler chain.
pub trait Middleware: Send + Sync + 'static {
    /// Processes the request, usually by awaiting `next.run(req)`.
    fn process(&self, req: Req, next: Next) -> BoxFuture<HttpResult<HttpResponse>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Req, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResult<HttpResponse>> + Send + 'static,
{
    fn process(&self, req: Req, next: Next) -> BoxFuture<HttpResult<HttpResponse>> {
        Box::pin(self(req, next))
    }
}

/// The rest of a middleware chain, ending in the handler.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.chain.len() - self.index))
            .finish_non_exhaustive()
    }
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>, handler: Arc<dyn Handler>) -> Self {
        Self {
            chain,
            index: 0,
            handler,
        }
    }

    /// Runs the next middleware, or the handler once none remain.
    pub fn run(self, req: Req) -> BoxFuture<HttpResult<HttpResponse>> {
        match self.chain.get(self.index).cloned() {
            Some(middleware) => {
                let next = Self {
                    index: self.index + 1,
                    ..self
                };
                middleware.process(req, next)
            }
            None => self.handler.call(req),
        }
    }
}
