//! Configuration for the scan loop

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use uascan_backend::RetryPolicy;
use uascan_protocol::defaults::{
    DEFAULT_AVAILABILITY_RETRY_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_SERVERS,
    DEFAULT_UPDATE_INTERVAL_SECS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Scan loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Sleep between cycles
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Delay between backend availability probes at startup
    #[serde(default = "default_availability_retry")]
    pub availability_retry_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Servers reconciled at once; 1 scans them one after another
    #[serde(default = "default_max_concurrent_servers")]
    pub max_concurrent_servers: usize,

    /// Backoff for gateway calls
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

fn default_availability_retry() -> u64 {
    DEFAULT_AVAILABILITY_RETRY_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_max_concurrent_servers() -> usize {
    DEFAULT_MAX_CONCURRENT_SERVERS
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            availability_retry_secs: default_availability_retry(),
            connect_timeout_secs: default_connect_timeout(),
            max_concurrent_servers: default_max_concurrent_servers(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig =
            toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_servers == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_servers must be at least 1".into(),
            ));
        }
        if self.update_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_secs must be positive".into(),
            ));
        }
        if self.availability_retry_secs == 0 {
            return Err(ConfigError::Invalid(
                "availability_retry_secs must be positive".into(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn availability_retry(&self) -> Duration {
        Duration::from_secs(self.availability_retry_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.update_interval(), Duration::from_secs(60));
        assert_eq!(config.availability_retry(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_concurrent_servers, 1);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ScanConfig::from_toml_str(
            r#"
update_interval_secs = 15
max_concurrent_servers = 4

[retry]
max_attempts = 5
"#,
        )
        .unwrap();
        assert_eq!(config.update_interval_secs, 15);
        assert_eq!(config.max_concurrent_servers, 4);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = ScanConfig::from_toml_str("max_concurrent_servers = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_sleeps_are_rejected() {
        for toml_str in ["update_interval_secs = 0", "availability_retry_secs = 0"] {
            let result = ScanConfig::from_toml_str(toml_str);
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "accepted {}",
                toml_str
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uascan.toml");
        let toml_str = toml::to_string_pretty(&ScanConfig::default()).unwrap();
        std::fs::write(&path, toml_str).unwrap();

        let loaded = ScanConfig::load(&path).unwrap();
        assert_eq!(loaded, ScanConfig::default());
    }
}
