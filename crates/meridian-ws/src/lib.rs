//! # Meridian WebSocket
//!
//! Duplex stream connections for the Meridian framework.
//!
//! A [`WebSocket`] is opened from an HTTP upgrade request and then runs on
//! its own tasks, independent of the request that created it:
//!
//! - bounded outbound and inbound queues ([`WebSocketConfig`])
//! - `send` applies backpressure, bounded by the caller's cancellation
//! - `close()` is idempotent and returns the closed confirmation
//! - listeners (such as the server's connection registry) are told when the
//!   stream opens and closes
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_ws::{WebSocket, WebSocketConfig};
//!
//! let (socket, response) = WebSocket::accept(&mut request, &WebSocketConfig::default())?;
//! tokio::spawn(async move {
//!     let cancel = meridian_core::Signal::new();
//!     while let Some(message) = socket.recv().await {
//!         if socket.send(&cancel, message.to_text().unwrap_or_default()).await.is_err() {
//!             break;
//!         }
//!     }
//! });
//! // return `response` to the client
//! ```

#![doc(html_root_url = "https://docs.rs/meridian-ws/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod connection;
mod error;
mod upgrade;

pub use config::WebSocketConfig;
pub use connection::WebSocket;
pub use error::{WsError, WsResult};
pub use upgrade::{compute_accept_key, is_websocket_request, validate_upgrade_request};

// Re-export the message type used by `recv`.
pub use tungstenite::Message;
