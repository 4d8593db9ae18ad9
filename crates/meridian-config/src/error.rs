//! Errors raised while assembling a [`MeridianConfig`](crate::MeridianConfig).

use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required config file does not exist.
    #[error("config file {} does not exist", path.display())]
    Missing {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// A config file exists but could not be read.
    #[error("cannot read config file {}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// The read failure.
        #[source]
        source: std::io::Error,
    },

    /// TOML content does not match the schema.
    #[error("bad TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON content does not match the schema.
    #[error("bad JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration could not be written out as TOML.
    #[error("cannot render config as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value parsed but is not usable.
    #[error("{field}: {reason}")]
    Invalid {
        /// Dotted path of the field, e.g. `streams.outgoing_capacity`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment override is malformed or names an unknown key.
    #[error("environment variable {var}: {reason}")]
    Env {
        /// The variable name, prefix included.
        var: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The file extension or format name is neither TOML nor JSON.
    #[error("unknown config format '{0}' (expected toml or json)")]
    UnknownFormat(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error points at a field value rather than a source.
    #[must_use]
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, Self::Invalid { .. } | Self::Env { .. })
    }
}
