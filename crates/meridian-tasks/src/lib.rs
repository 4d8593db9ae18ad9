//! # Meridian Tasks
//!
//! Supervised background services for the Meridian framework.
//!
//! A [`Service`] is a cancellable task with observable start and stop
//! signals. Services compose with [`group`], which starts members in order
//! and tears all of them down together.
//!
//! ```rust,no_run
//! use meridian_tasks::{group, Service};
//!
//! #[tokio::main]
//! async fn main() {
//!     let worker = Service::new("worker", |cancel, started| async move {
//!         started.fire();
//!         cancel.wait().await;
//!         Ok(())
//!     });
//!
//!     let app = group("app", [worker]);
//!     app.start().wait().await;
//!     if let Some(err) = app.start_error() {
//!         eprintln!("startup failed: {err}");
//!         return;
//!     }
//!
//!     // ... run until asked to stop ...
//!
//!     app.stop().wait().await;
//! }
//! ```
//!
//! ## Lifecycle
//!
//! - `start()` spawns the run body once; later calls return the same signal
//! - `stop()` cancels a running body, or marks a never-started service stopped
//! - `started()` fires when the body signals readiness or returns
//! - `stopped()` fires after the body has returned
//! - A body error before readiness is a start error, after it a stop error
//! - A panicking body is captured as a [`ServiceError::Panicked`] error

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod group;
mod service;

pub use error::{ServiceError, ServiceResult};
pub use group::group;
pub use service::{BoxFuture, RunFn, Service, ServiceState};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ServiceError, ServiceResult};
    pub use crate::group::group;
    pub use crate::service::{Service, ServiceState};
    pub use meridian_core::Signal;
}
