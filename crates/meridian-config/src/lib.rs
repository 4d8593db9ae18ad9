//! # Meridian Config
//!
//! Typed configuration for Meridian servers.
//!
//! [`ConfigLoader`] layers defaults, a TOML or JSON file and environment
//! variables into a validated [`MeridianConfig`]:
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! static_root = "./public"
//!
//! [streams]
//! outgoing_capacity = 8
//! incoming_capacity = 8
//! max_message_size = 65536
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! Environment overrides use `PREFIX__SECTION__KEY`, for example
//! `MERIDIAN__SERVER__HTTP_ADDR=127.0.0.1:9000`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::MeridianConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{LoggingConfig, ServerConfig, StreamsConfig};

// Re-exported so callers can name the format without a telemetry dependency.
pub use meridian_telemetry::LogFormat;
