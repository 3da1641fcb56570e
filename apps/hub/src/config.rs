//! Hub configuration
//!
//! Loaded in three layers: built-in defaults, an optional JSON file
//! (`VIBHUB_CONFIG`, default `config.json`), then environment variables.

use serde_json::Value;
use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::relay::identity::{IdentityPolicy, DEFAULT_MAX_ID_LEN, DEFAULT_MIN_ID_LEN};

/// Default listen port
pub const DEFAULT_PORT: u16 = 6969;

/// Default path of the JSON config file
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Configuration-related errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid value for environment variable
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Configuration validation error
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime settings of the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Listen port (default: 6969)
    pub port: u16,

    /// Verbose logging
    pub debug: bool,

    /// Shortest accepted device id
    pub device_id_min_size: usize,

    /// Longest accepted device id
    pub device_id_max_size: usize,

    /// Compare device ids without case folding
    pub device_id_case_sensitive: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            debug: false,
            device_id_min_size: DEFAULT_MIN_ID_LEN,
            device_id_max_size: DEFAULT_MAX_ID_LEN,
            device_id_case_sensitive: false,
        }
    }
}

impl HubConfig {
    /// Load configuration from the config file and the process environment
    pub fn from_env() -> ConfigResult<Self> {
        let explicit_path = env::var("VIBHUB_CONFIG").ok().filter(|s| !s.is_empty());
        let path = explicit_path
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = Self::default();
        config.load_file(Path::new(&path), explicit_path.is_some());
        config.apply_env_from(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Merge a JSON config file; problems are logged and the file skipped
    pub fn load_file(&mut self, path: &Path, required: bool) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Config file unreadable, using defaults");
                return;
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(value) => self.merge_json(&value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Config file is not valid JSON, ignoring");
            }
        }
    }

    /// Apply known keys of a JSON object; unknown or mistyped keys are ignored
    pub fn merge_json(&mut self, value: &Value) {
        let Some(map) = value.as_object() else {
            tracing::warn!("Config file must contain a JSON object, ignoring");
            return;
        };

        for (key, value) in map {
            let applied = match key.as_str() {
                "port" => json_uint(value)
                    .and_then(|n| u16::try_from(n).ok())
                    .map(|port| self.port = port),
                "debug" => value.as_bool().map(|debug| self.debug = debug),
                "device_id_min_size" => json_uint(value)
                    .and_then(|n| usize::try_from(n).ok())
                    .map(|n| self.device_id_min_size = n),
                "device_id_max_size" => json_uint(value)
                    .and_then(|n| usize::try_from(n).ok())
                    .map(|n| self.device_id_max_size = n),
                "device_id_case_sensitive" => value
                    .as_bool()
                    .map(|flag| self.device_id_case_sensitive = flag),
                _ => {
                    tracing::warn!(key = %key, "Unknown config key, ignoring");
                    continue;
                }
            };

            if applied.is_none() {
                tracing::warn!(key = %key, value = %value, "Config value has the wrong type, ignoring");
            }
        }
    }

    /// Apply environment overrides through a variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_var(&lookup, "PORT")? {
            self.port = port;
        }
        if let Some(debug) = parse_flag(&lookup, "DEBUG")? {
            self.debug = debug;
        }
        if let Some(min) = parse_var(&lookup, "DEVICE_ID_MIN_SIZE")? {
            self.device_id_min_size = min;
        }
        if let Some(max) = parse_var(&lookup, "DEVICE_ID_MAX_SIZE")? {
            self.device_id_max_size = max;
        }
        if let Some(flag) = parse_flag(&lookup, "DEVICE_ID_CASE_SENSITIVE")? {
            self.device_id_case_sensitive = flag;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.device_id_min_size == 0 {
            return Err(ConfigError::ValidationError(
                "device_id_min_size must be at least 1".to_string(),
            ));
        }
        if self.device_id_min_size > self.device_id_max_size {
            return Err(ConfigError::ValidationError(format!(
                "device_id_min_size ({}) exceeds device_id_max_size ({})",
                self.device_id_min_size, self.device_id_max_size
            )));
        }
        Ok(())
    }

    pub fn identity_policy(&self) -> IdentityPolicy {
        IdentityPolicy::new(
            self.device_id_min_size,
            self.device_id_max_size,
            self.device_id_case_sensitive,
        )
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "vibhub_hub=debug,tower_http=debug"
        } else {
            "vibhub_hub=info,tower_http=info"
        }
    }
}

/// Non-negative integer given as a number or a numeric string
fn json_uint(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(None),
    }
}

fn parse_flag<F>(lookup: &F, name: &str) -> ConfigResult<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|s| !s.is_empty()) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("expected a boolean, got '{raw}'"),
            )),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.port, 6969);
        assert!(!config.debug);
        assert_eq!(config.identity_policy(), IdentityPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_json_ignores_unknown_and_mistyped() {
        let mut config = HubConfig::default();
        config.merge_json(&json!({
            "port": "8080",
            "debug": "yes",
            "device_id_max_size": 64,
            "device_id_case_sensitive": true,
            "colour": "blue",
        }));

        assert_eq!(config.port, 8080);
        assert!(!config.debug);
        assert_eq!(config.device_id_max_size, 64);
        assert!(config.device_id_case_sensitive);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = HubConfig::default();
        config.merge_json(&json!({"port": 7000, "debug": false}));
        config
            .apply_env_from(lookup(&[("PORT", "7100"), ("DEBUG", "true")]))
            .unwrap();

        assert_eq!(config.port, 7100);
        assert!(config.debug);
        assert_eq!(config.log_filter(), "vibhub_hub=debug,tower_http=debug");
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = HubConfig::default();
        let err = config
            .apply_env_from(lookup(&[("DEVICE_ID_MIN_SIZE", "three")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "DEVICE_ID_MIN_SIZE"));

        let err = config
            .apply_env_from(lookup(&[("DEVICE_ID_CASE_SENSITIVE", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(..)));
    }

    #[test]
    fn test_validation_bounds() {
        let config = HubConfig {
            device_id_min_size: 10,
            device_id_max_size: 5,
            ..HubConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let config = HubConfig {
            device_id_min_size: 0,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 9000, "device_id_min_size": 4}}"#).unwrap();

        let mut config = HubConfig::default();
        config.load_file(file.path(), true);
        assert_eq!(config.port, 9000);
        assert_eq!(config.device_id_min_size, 4);
    }

    #[test]
    fn test_load_missing_or_broken_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HubConfig::default();
        config.load_file(&dir.path().join("absent.json"), false);
        assert_eq!(config, HubConfig::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        config.load_file(&broken, true);
        assert_eq!(config, HubConfig::default());
    }
}
