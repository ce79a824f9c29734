//! Engine configuration
//!
//! Loaded from a JSON file. Every field is optional and falls back to its
//! default, so `{}` is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::condition::Strictness;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `report_engine=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum secondary indexes per materialized collection
    #[serde(default = "default_index_budget")]
    pub index_budget: usize,

    /// Key-sets of this many keys or more are never indexed
    #[serde(default = "default_max_index_keys")]
    pub max_index_keys: usize,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_materialize_timeout_secs")]
    pub materialize_timeout_secs: u64,

    #[serde(default = "default_index_timeout_secs")]
    pub index_timeout_secs: u64,

    /// Rows per batch when streaming a download
    #[serde(default = "default_download_batch_size")]
    pub download_batch_size: usize,

    /// Reports materialized in parallel
    #[serde(default = "default_materialize_workers")]
    pub materialize_workers: usize,

    /// Reject uninterpretable conditions instead of skipping them
    #[serde(default)]
    pub strict_conditions: bool,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_index_budget() -> usize {
    52
}
fn default_max_index_keys() -> usize {
    31
}
fn default_query_timeout_secs() -> u64 {
    30
}
fn default_download_timeout_secs() -> u64 {
    30 * 60
}
fn default_materialize_timeout_secs() -> u64 {
    10 * 60
}
fn default_index_timeout_secs() -> u64 {
    60
}
fn default_download_batch_size() -> usize {
    100
}
fn default_materialize_workers() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_budget: default_index_budget(),
            max_index_keys: default_max_index_keys(),
            query_timeout_secs: default_query_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            materialize_timeout_secs: default_materialize_timeout_secs(),
            index_timeout_secs: default_index_timeout_secs(),
            download_batch_size: default_download_batch_size(),
            materialize_workers: default_materialize_workers(),
            strict_conditions: false,
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_budget == 0 {
            return Err(ConfigError::Invalid("index_budget must be > 0".into()));
        }
        if self.max_index_keys == 0 {
            return Err(ConfigError::Invalid("max_index_keys must be > 0".into()));
        }
        if self.download_batch_size == 0 {
            return Err(ConfigError::Invalid("download_batch_size must be > 0".into()));
        }
        if self.materialize_workers == 0 {
            return Err(ConfigError::Invalid("materialize_workers must be > 0".into()));
        }
        let timeouts = [
            ("query_timeout_secs", self.query_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
            ("materialize_timeout_secs", self.materialize_timeout_secs),
            ("index_timeout_secs", self.index_timeout_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn materialize_timeout(&self) -> Duration {
        Duration::from_secs(self.materialize_timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    pub fn strictness(&self) -> Strictness {
        if self.strict_conditions {
            Strictness::Strict
        } else {
            Strictness::Lenient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_config("{}");
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.index_budget, 52);
        assert_eq!(config.max_index_keys, 31);
        assert_eq!(config.download_batch_size, 100);
        assert_eq!(config.query_timeout(), Duration::from_secs(30));
        assert_eq!(config.materialize_timeout(), Duration::from_secs(600));
        assert_eq!(config.download_timeout(), Duration::from_secs(1800));
        assert_eq!(config.strictness(), Strictness::Lenient);
    }

    #[test]
    fn test_overrides() {
        let file = write_config(
            r#"{"index_budget": 8, "strict_conditions": true, "log": {"format": "pretty"}}"#,
        );
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.index_budget, 8);
        assert_eq!(config.strictness(), Strictness::Strict);
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_zero_budget_rejected() {
        let file = write_config(r#"{"index_budget": 0}"#);
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = write_config(r#"{"index_timeout_secs": 0}"#);
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("index_timeout_secs"));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_config("{not json");
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/report-engine.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
