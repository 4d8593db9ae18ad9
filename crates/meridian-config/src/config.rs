//! Root configuration type.

use std::net::SocketAddr;
use std::time::Duration;

use meridian_telemetry::LogFormat;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schema::{LoggingConfig, ServerConfig, StreamsConfig};

/// Complete Meridian configuration.
///
/// # Example
///
/// ```
/// use meridian_config::MeridianConfig;
///
/// let config = MeridianConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MeridianConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Stream queue settings.
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MeridianConfig {
    /// Local development preset: loopback address, pretty debug logs and a
    /// short shutdown timeout.
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                http_addr: "127.0.0.1:8080".to_string(),
                shutdown_timeout_secs: 5,
                static_root: None,
            },
            streams: StreamsConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                include_location: true,
            },
        }
    }

    /// Production preset: all interfaces and JSON logs.
    pub fn production() -> Self {
        Self::default()
    }

    /// Checks values that deserialisation alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http_addr()?;

        for (field, value) in [
            ("streams.outgoing_capacity", self.streams.outgoing_capacity),
            ("streams.incoming_capacity", self.streams.incoming_capacity),
            ("streams.max_message_size", self.streams.max_message_size),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }

        Ok(())
    }

    /// The parsed listener address.
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.http_addr.parse().map_err(|e| {
            ConfigError::invalid(
                "server.http_addr",
                format!("'{}' is not a socket address: {e}", self.server.http_addr),
            )
        })
    }

    /// Grace period for in-flight connections on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Serialises to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
