//! # Meridian
//!
//! **Request routing, long-lived streams and supervised shutdown for HTTP
//! servers.**
//!
//! - a compiled route tree with path parameters, catch-all segments and
//!   nested middleware
//! - WebSocket and Server-Sent Events streams that run on their own tasks
//!   and are drained when the server shuts down
//! - supervised services with start/stop signals and ordered groups
//! - layered configuration and structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meridian::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_env_prefix("APP").load()?;
//!     init_logging(&config.logging.to_log_config())?;
//!
//!     let mut router = Router::new();
//!     router.get("/users/:id", |req: Req| async move {
//!         let id = req.int64("id");
//!         Ok(req.resp().text(format!("user {id}")))
//!     })?;
//!
//!     serve(config, router).await
//! }
//! ```
//!
//! ## Shutdown
//!
//! ```text
//! SIGTERM -> stop HTTP service -> drain in-flight requests -> close streams -> exit
//! ```

#![doc(html_root_url = "https://docs.rs/meridian/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use meridian_config as config;
pub use meridian_core as core;
pub use meridian_router as router;
pub use meridian_server as server;
pub use meridian_sse as sse;
pub use meridian_tasks as tasks;
pub use meridian_telemetry as telemetry;
pub use meridian_ws as ws;

/// Prelude module for convenient imports.
///
/// ```rust
/// use meridian::prelude::*;
/// ```
pub mod prelude {
    pub use meridian_core::{HttpError, HttpResult, Signal, StreamHandle, StreamId, StreamListener};

    pub use meridian_server::{
        serve, serve_with_shutdown, HttpResponse, HttpServer, Middleware, Next, Req, Resp, Router,
    };

    pub use meridian_ws::{Message, WebSocket, WebSocketConfig, WsError};

    pub use meridian_sse::{SseError, SseEvent, SseStream};

    pub use meridian_tasks::{group, Service, ServiceError};

    pub use meridian_config::{ConfigLoader, MeridianConfig};

    pub use meridian_telemetry::{init_logging, LogConfig};
}
