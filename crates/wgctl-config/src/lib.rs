#![deny(unsafe_code)]

//! Configuration loading and validation for wgctl.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central structure: it tells the control client where interface sockets
//! live, how long transport operations may block, and how the DNS monitor
//! polls.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Smallest DNS monitor interval accepted from configuration, in seconds.
pub const MIN_MONITOR_INTERVAL_SECS: u64 = 10;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Control transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// DNS monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where interface control endpoints live and how long I/O may block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Directory holding `<interface>.sock` control sockets (Unix).
    #[serde(default = "default_socket_dir")]
    pub socket_dir: String,

    /// Named pipe prefix; the interface name is appended (Windows).
    #[serde(default = "default_pipe_root")]
    pub pipe_root: String,

    /// Connect timeout in seconds.
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    /// Deadline for reading a full response, in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Deadline for writing a request, in seconds.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            pipe_root: default_pipe_root(),
            dial_timeout_secs: default_dial_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

fn default_socket_dir() -> String {
    "/var/run/wireguard".to_string()
}

fn default_pipe_root() -> String {
    r"\\.\pipe\ProtectedPrefix\Administrators\WireGuard".to_string()
}

fn default_dial_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    10
}

fn default_write_timeout_secs() -> u64 {
    5
}

/// DNS monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How often domain endpoints are re-resolved, in seconds.
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound on a single resolution, in seconds.
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval_secs(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
        }
    }
}

fn default_monitor_interval_secs() -> u64 {
    60
}

fn default_resolve_timeout_secs() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transport = &self.transport;
        if transport.socket_dir.is_empty() {
            return Err(ConfigError::Validation(
                "transport.socket_dir must not be empty".to_string(),
            ));
        }
        if transport.pipe_root.is_empty() {
            return Err(ConfigError::Validation(
                "transport.pipe_root must not be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("transport.dial_timeout_secs", transport.dial_timeout_secs),
            ("transport.read_timeout_secs", transport.read_timeout_secs),
            ("transport.write_timeout_secs", transport.write_timeout_secs),
            ("monitor.resolve_timeout_secs", self.monitor.resolve_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }

        if self.monitor.interval_secs < MIN_MONITOR_INTERVAL_SECS {
            return Err(ConfigError::Validation(format!(
                "monitor.interval_secs must be at least {MIN_MONITOR_INTERVAL_SECS}, got {}",
                self.monitor.interval_secs
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.transport.socket_dir, "/var/run/wireguard");
        assert_eq!(config.transport.dial_timeout_secs, 5);
        assert_eq!(config.transport.read_timeout_secs, 10);
        assert_eq!(config.monitor.interval_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.monitor.resolve_timeout_secs, 10);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [transport]
            socket_dir = "/run/wg"
            dial_timeout_secs = 2
            read_timeout_secs = 4

            [monitor]
            interval_secs = 30
            resolve_timeout_secs = 3

            [logging]
            level = "debug"
        "#;

        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.transport.socket_dir, "/run/wg");
        assert_eq!(config.transport.dial_timeout_secs, 2);
        assert_eq!(config.transport.read_timeout_secs, 4);
        assert_eq!(config.transport.write_timeout_secs, 5);
        assert_eq!(config.monitor.interval_secs, 30);
        assert_eq!(config.monitor.resolve_timeout_secs, 3);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_short_interval() {
        let toml = r#"
            [monitor]
            interval_secs = 9
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("monitor.interval_secs"));
    }

    #[test]
    fn test_validation_accepts_minimum_interval() {
        let toml = r#"
            [monitor]
            interval_secs = 10
        "#;
        assert!(AppConfig::parse(toml).is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let toml = r#"
            [transport]
            dial_timeout_secs = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_socket_dir() {
        let toml = r#"
            [transport]
            socket_dir = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let toml = r#"
            [logging]
            level = "chatty"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = AppConfig::parse("[transport\nsocket_dir = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wgctl.toml");
        tokio::fs::write(&path, "[monitor]\ninterval_secs = 45\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.monitor.interval_secs, 45);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = AppConfig::load(&dir.path().join("absent.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = AppConfig::default();
        config.monitor.interval_secs = 120;
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::parse(&text).unwrap();
        assert_eq!(parsed.monitor.interval_secs, 120);
    }
}
