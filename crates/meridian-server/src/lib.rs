//! # Meridian Server
//!
//! Request dispatch and server lifecycle for the Meridian framework.
//!
//! - [`Router`] matches requests against a route tree and runs the
//!   middleware chain and handler, turning every failure (including panics)
//!   into an error response
//! - [`Req`] and [`Resp`] are the request and response helpers handed to
//!   handlers, including the WebSocket and SSE upgrades
//! - [`ConnectionRegistry`] tracks the streams opened through the router and
//!   drains them on shutdown
//! - [`HttpServer`] is the accept loop, run as a [`meridian_tasks::Service`]
//! - [`serve`] runs the full start, signal, stop and drain sequence
//!
//! ## Example
//!
//! ```rust,no_run
//! use meridian_config::MeridianConfig;
//! use meridian_server::{serve, Req, Router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut router = Router::new();
//!     router.get("/hello/:name", |req: Req| async move {
//!         let name = req.param("name").unwrap_or("world").to_string();
//!         Ok(req.resp().text(format!("hello, {name}")))
//!     })?;
//!
//!     serve(MeridianConfig::default(), router).await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/meridian-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod buffer;
mod error;
mod handler;
mod registry;
mod request;
mod response;
mod router;
mod server;
pub mod shutdown;
mod static_files;

pub use buffer::{BufferPool, PooledBuffer};
pub use error::ServerError;
pub use handler::{BoxFuture, Handler, Middleware, Next};
pub use registry::ConnectionRegistry;
pub use request::{empty_body, Req, RequestBody, MAX_BODY_SIZE};
pub use response::{content_type, empty, error_response, full, HttpResponse, Resp, ResponseBody};
pub use router::Router;
pub use server::{serve, serve_with_shutdown, HttpServer};
pub use shutdown::{ConnectionToken, ConnectionTracker};
pub use static_files::{StaticFileError, StaticFiles};
