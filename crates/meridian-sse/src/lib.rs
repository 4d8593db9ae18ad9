//! # Meridian SSE
//!
//! Server-Sent Events push streams for the Meridian framework.
//!
//! [`SseStream::open`] returns the stream handle and the response to send.
//! Events queued on the handle are written by the stream's own task, in
//! order, until the stream is closed, the request is cancelled or the
//! client disconnects.
//!
//! ```rust
//! use meridian_core::Signal;
//! use meridian_sse::{SseConfig, SseEvent, SseStream};
//!
//! # tokio_test::block_on(async {
//! let (stream, response) = SseStream::open("/events", &SseConfig::default(), Signal::new());
//! assert_eq!(response.headers()["content-type"], "text/event-stream");
//!
//! let cancel = Signal::new();
//! stream.send_event(&cancel, SseEvent::new("42").event("answer")).await.unwrap();
//! stream.close().wait().await;
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/meridian-sse/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod event;
mod stream;

pub use config::SseConfig;
pub use error::{SseError, SseResult};
pub use event::SseEvent;
pub use stream::{SseBody, SseStream, CONTENT_TYPE};
