//! Layered configuration loading.
//!
//! Layers apply in order, later ones overriding earlier ones:
//! 1. defaults or a preset
//! 2. a TOML or JSON file
//! 3. `PREFIX__SECTION__KEY` environment variables

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use meridian_telemetry::LogFormat;

use crate::config::MeridianConfig;
use crate::error::ConfigError;

/// Builds a [`MeridianConfig`] from defaults, files and the environment.
///
/// # Example
///
/// ```no_run
/// use meridian_config::ConfigLoader;
///
/// # fn main() -> Result<(), meridian_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("meridian.toml")?
///     .with_dotenv()
///     .with_env_prefix("MERIDIAN")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: MeridianConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader starting from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the default values.
    pub fn with_defaults(mut self) -> Self {
        self.config = MeridianConfig::default();
        self
    }

    /// Starts from the development preset.
    ///
    /// ```
    /// use meridian_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    pub fn with_development(mut self) -> Self {
        self.config = MeridianConfig::development();
        self
    }

    /// Starts from the production preset.
    pub fn with_production(mut self) -> Self {
        self.config = MeridianConfig::production();
        self
    }

    /// Loads a file, picking the format from its extension.
    ///
    /// Sections missing from the file take their default values.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing { path: path.to_path_buf() });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Loads a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration text in the given format (`"toml"` or `"json"`).
    ///
    /// ```
    /// use meridian_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nhttp_addr = \"127.0.0.1:3000\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_ascii_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnknownFormat(other.to_string())),
        };
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__KEY` environment overrides, applied by
    /// [`load`](Self::load).
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Reads a `.env` file into the process environment, if one exists.
    pub fn with_dotenv(self) -> Self {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();
        self
    }

    /// Applies environment overrides and validates.
    pub fn load(mut self) -> Result<MeridianConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(key, _)| key.starts_with(&prefix))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration as loaded so far, without environment
    /// overrides or validation.
    pub fn load_unvalidated(self) -> MeridianConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<MeridianConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnknownFormat(path.display().to_string())),
        }
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        // Variables that share the prefix but not the separator belong to
        // something else.
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "STATIC_ROOT"] => {
                config.server.static_root = (!value.is_empty()).then(|| value.to_string());
            }
            ["STREAMS", "OUTGOING_CAPACITY"] => {
                config.streams.outgoing_capacity = parse_number(key, value)?;
            }
            ["STREAMS", "INCOMING_CAPACITY"] => {
                config.streams.incoming_capacity = parse_number(key, value)?;
            }
            ["STREAMS", "MAX_MESSAGE_SIZE"] => {
                config.streams.max_message_size = parse_number(key, value)?;
            }
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = LogFormat::from_str(value)
                    .map_err(|e| ConfigError::env(key, e.to_string()))?;
            }
            ["LOGGING", "INCLUDE_LOCATION"] => {
                config.logging.include_location = parse_bool(key, value)?;
            }
            _ => return Err(ConfigError::env(key, "unknown configuration key")),
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(key, format!("expected integer, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env(
            key,
            format!("expected boolean, got '{value}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const PREFIX: &str = "MERIDIAN";

    fn apply(loader: &mut ConfigLoader, key: &str, value: &str) -> Result<(), ConfigError> {
        loader.apply_env_var(key, value, PREFIX)
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, MeridianConfig::default());
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            http_addr = "127.0.0.1:9000"
            static_root = "/srv/www"

            [streams]
            outgoing_capacity = 64
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:9000");
        assert_eq!(config.server.static_root.as_deref(), Some("/srv/www"));
        assert_eq!(config.streams.outgoing_capacity, 64);
        assert_eq!(config.streams.incoming_capacity, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"logging": {{"level": "warn", "format": "pretty"}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new().with_file("/nonexistent/meridian.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn test_optional_file_missing() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/meridian.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, MeridianConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormat(_)));
    }

    #[test]
    fn test_unknown_field_in_file() {
        let err = ConfigLoader::new()
            .with_string("[server]\nport = 80", "toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_invalid_value_fails_load() {
        let err = ConfigLoader::new()
            .with_string("[streams]\noutgoing_capacity = 0", "toml")
            .unwrap()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "MERIDIAN__SERVER__HTTP_ADDR", "127.0.0.1:7000").unwrap();
        apply(&mut loader, "MERIDIAN__SERVER__SHUTDOWN_TIMEOUT_SECS", "10").unwrap();
        apply(&mut loader, "MERIDIAN__SERVER__STATIC_ROOT", "./public").unwrap();
        apply(&mut loader, "MERIDIAN__STREAMS__INCOMING_CAPACITY", "16").unwrap();
        apply(&mut loader, "MERIDIAN__STREAMS__MAX_MESSAGE_SIZE", "1024").unwrap();
        apply(&mut loader, "MERIDIAN__LOGGING__FORMAT", "pretty").unwrap();
        apply(&mut loader, "MERIDIAN__LOGGING__INCLUDE_LOCATION", "yes").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.server.http_addr, "127.0.0.1:7000");
        assert_eq!(config.server.shutdown_timeout_secs, 10);
        assert_eq!(config.server.static_root.as_deref(), Some("./public"));
        assert_eq!(config.streams.incoming_capacity, 16);
        assert_eq!(config.streams.max_message_size, 1024);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.include_location);
    }

    #[test]
    fn test_env_parse_errors() {
        let mut loader = ConfigLoader::new();
        assert!(apply(&mut loader, "MERIDIAN__STREAMS__OUTGOING_CAPACITY", "many").is_err());
        assert!(apply(&mut loader, "MERIDIAN__LOGGING__INCLUDE_LOCATION", "maybe").is_err());
        assert!(apply(&mut loader, "MERIDIAN__LOGGING__FORMAT", "xml").is_err());
        assert!(apply(&mut loader, "MERIDIAN__SERVER__PORT", "80").is_err());
    }

    #[test]
    fn test_env_key_without_separator_ignored() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "MERIDIAN_HOME", "/opt/meridian").unwrap();
        assert_eq!(loader.load_unvalidated(), MeridianConfig::default());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("K", "TRUE").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
        assert!(parse_bool("K", "").is_err());
    }
}
