//! [`AppConfig`] builder for tests.

use std::path::Path;

use wgctl_config::AppConfig;

/// Fluent builder over [`AppConfig::default`].
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_dir(dir.path())
///     .read_timeout_secs(1)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket_dir(mut self, dir: &Path) -> Self {
        self.config.transport.socket_dir = dir.display().to_string();
        self
    }

    pub fn dial_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transport.dial_timeout_secs = secs;
        self
    }

    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transport.read_timeout_secs = secs;
        self
    }

    pub fn write_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transport.write_timeout_secs = secs;
        self
    }

    pub fn monitor_interval_secs(mut self, secs: u64) -> Self {
        self.config.monitor.interval_secs = secs;
        self
    }

    pub fn resolve_timeout_secs(mut self, secs: u64) -> Self {
        self.config.monitor.resolve_timeout_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
