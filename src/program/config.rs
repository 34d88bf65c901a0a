//! Stack Configuration
//!
//! Read-only view over the configuration values handed to a stack
//! program. Keys are namespaced by project (`<project>:<key>`); a bare
//! key is resolved against the current project.
//!
//! The engine passes configuration to the program through the
//! `PULUMI_CONFIG` environment variable as a flat JSON object:
//!
//! ```json
//! { "pet-stack:name": "fluffy", "pet-stack:length": "3" }
//! ```

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use log::debug;
use thiserror::Error;

/// Environment variable carrying the stack configuration.
pub const CONFIG_ENV_VAR: &str = "PULUMI_CONFIG";

/// Errors raised while reading stack configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Missing required configuration variable '{key}'\n\tplease set a value using the command `pulumi config set {key} <value>`"
    )]
    Missing { key: String },

    #[error("Configuration key '{key}' is expected to be of type {expected}, but got '{value}'")]
    InvalidType {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("Malformed PULUMI_CONFIG: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Configuration values for one project.
#[derive(Debug, Clone, Default)]
pub struct Config {
    project: String,
    values: HashMap<String, String>,
}

impl Config {
    /// Creates an empty configuration for a project.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            values: HashMap::new(),
        }
    }

    /// Creates a configuration from already-namespaced or bare keys.
    pub fn from_map<K, V>(project: impl Into<String>, map: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::new(project);
        for (key, value) in map {
            config.set(key.as_ref(), value);
        }
        config
    }

    /// Loads the configuration from [`CONFIG_ENV_VAR`].
    ///
    /// An unset variable yields an empty configuration.
    pub fn from_env(project: impl Into<String>) -> Result<Self, ConfigError> {
        let project = project.into();
        let Ok(raw) = env::var(CONFIG_ENV_VAR) else {
            debug!("{} not set, using empty configuration", CONFIG_ENV_VAR);
            return Ok(Self::new(project));
        };
        Self::from_json(project, &raw)
    }

    /// Parses a JSON object of string values.
    pub fn from_json(project: impl Into<String>, raw: &str) -> Result<Self, ConfigError> {
        let map: HashMap<String, String> = serde_json::from_str(raw)?;
        debug!("Loaded {} configuration values", map.len());
        Ok(Self::from_map(project, map))
    }

    /// Returns the project this configuration belongs to.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Sets a value, namespacing bare keys with the project.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let full = self.full_key(key);
        self.values.insert(full, value.into());
    }

    /// Returns the value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&self.full_key(key)).map(String::as_str)
    }

    /// Returns the value for a key or fails with [`ConfigError::Missing`].
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing {
            key: self.full_key(key),
        })
    }

    /// Parses an optional value into `T`.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidType {
                key: self.full_key(key),
                expected: std::any::type_name::<T>(),
                value: raw.to_string(),
            })
    }

    fn full_key(&self, key: &str) -> String {
        if key.contains(':') {
            key.to_string()
        } else {
            format!("{}:{}", self.project, key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_key_is_namespaced() {
        let config = Config::from_map("proj", [("name", "rex")]);
        assert_eq!(config.get("name"), Some("rex"));
        assert_eq!(config.get("proj:name"), Some("rex"));
    }

    #[test]
    fn test_other_project_key_not_visible_as_bare() {
        let config = Config::from_map("proj", [("other:name", "rex")]);
        assert_eq!(config.get("name"), None);
        assert_eq!(config.get("other:name"), Some("rex"));
    }

    #[test]
    fn test_require_missing() {
        let config = Config::new("proj");
        let err = config.require("name").unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == "proj:name"));
        assert!(err.to_string().contains("pulumi config set proj:name"));
    }

    #[test]
    fn test_from_json() {
        let config = Config::from_json("proj", r#"{"proj:name":"fido","proj:length":"3"}"#).unwrap();
        assert_eq!(config.require("name").unwrap(), "fido");
        assert_eq!(config.get_parsed::<u32>("length").unwrap(), Some(3));
    }

    #[test]
    fn test_from_json_malformed() {
        let result = Config::from_json("proj", "not json");
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_get_parsed_invalid() {
        let config = Config::from_map("proj", [("length", "many")]);
        let err = config.get_parsed::<u32>("length").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidType { .. }));
    }

    #[test]
    fn test_get_parsed_absent() {
        let config = Config::new("proj");
        assert_eq!(config.get_parsed::<u32>("length").unwrap(), None);
    }
}
