//! Configuration schema definitions.
//!
//! Every section rejects unknown fields and fills missing ones from its
//! defaults.

use meridian_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Seconds to wait for in-flight connections during shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Directory served under `/static/*`, if any.
    #[serde(default)]
    pub static_root: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            static_root: None,
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// Stream connection queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StreamsConfig {
    /// Outbound queue capacity per stream.
    #[serde(default = "default_capacity")]
    pub outgoing_capacity: usize,

    /// Inbound queue capacity per duplex stream.
    #[serde(default = "default_capacity")]
    pub incoming_capacity: usize,

    /// Largest accepted duplex message, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            outgoing_capacity: default_capacity(),
            incoming_capacity: default_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

const fn default_capacity() -> usize {
    8
}

const fn default_max_message_size() -> usize {
    64 * 1024
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `"info"` or `"meridian_server=debug,info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include file and line in each event.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Converts to the subscriber settings used by `init_logging`.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level.clone(),
            format: self.format,
            include_location: self.include_location,
            ..LogConfig::default()
        }
    }
}
