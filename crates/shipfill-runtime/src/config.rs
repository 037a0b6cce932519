//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use shipfill_core::ACCOUNT_NUMBER_ENV;

/// Environment keys the runtime knows how to use as defaults.
pub const RECOGNISED_ENV_KEYS: [&str; 1] = [ACCOUNT_NUMBER_ENV];

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Config validation failed: {0}")]
    ValidationError(String),

    #[error("Request profile not configured")]
    MissingProfile,
}

/// Configuration for the completion loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Form presentations allowed per completion.
    pub max_retries: u32,

    /// Environment tier of defaults, e.g. `UPS_ACCOUNT_NUMBER`.
    pub env: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            env: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Fill recognised keys from the process environment.
    ///
    /// Keys already set in the config are kept; blank variables are ignored.
    pub fn with_process_env(mut self) -> Self {
        for key in RECOGNISED_ENV_KEYS {
            if self.env.contains_key(key) {
                continue;
            }
            if let Some(value) = std::env::var(key).ok().filter(|v| !v.trim().is_empty()) {
                self.env.insert(key.to_string(), value);
            }
        }
        self
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.env.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
max_retries: 5
env:
  UPS_ACCOUNT_NUMBER: "A1B2C3"
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.env[ACCOUNT_NUMBER_ENV], "A1B2C3");
    }

    #[test]
    fn test_from_yaml_partial_uses_defaults() {
        let config = RuntimeConfig::from_yaml("env: {}\n").unwrap();
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_zero_retries_rejected() {
        assert!(matches!(
            RuntimeConfig::from_yaml("max_retries: 0\n"),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RuntimeConfig::from_yaml_file("/nonexistent/shipfill.yaml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_explicit_env_kept_over_process_env() {
        let config = RuntimeConfig::default()
            .env_var(ACCOUNT_NUMBER_ENV, "EXPLICIT")
            .with_process_env();
        assert_eq!(config.env[ACCOUNT_NUMBER_ENV], "EXPLICIT");
    }
}
