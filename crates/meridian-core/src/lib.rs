//! # Meridian Core
//!
//! Foundational types shared by every Meridian crate:
//!
//! - [`Signal`] - fire-once broadcast signal, also used as a cancellation token
//! - [`HttpError`] - closed classification of request failures
//! - [`StreamHandle`], [`StreamListener`], [`StreamLifecycle`] - the open/close
//!   protocol shared by duplex and push streams
//! - [`panic_message`] - readable text of a recovered panic

#![doc(html_root_url = "https://docs.rs/meridian-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod panic;
mod signal;
pub mod stream;

pub use error::{BoxError, HttpError, HttpResult};
pub use panic::panic_message;
pub use signal::Signal;
pub use stream::{StreamHandle, StreamId, StreamLifecycle, StreamListener};
