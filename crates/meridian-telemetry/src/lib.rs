//! # Meridian Telemetry
//!
//! Logging setup for Meridian servers.
//!
//! All Meridian crates emit `tracing` events with structured fields
//! (`stream_id`, `method`, `path`, `service`, `panic`). This crate installs
//! the subscriber that renders them:
//!
//! ```rust,no_run
//! use meridian_telemetry::{init_logging, LogConfig};
//!
//! fn main() -> Result<(), meridian_telemetry::TelemetryError> {
//!     init_logging(&LogConfig::production())?;
//!     tracing::info!("server starting");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
