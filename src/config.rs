//! Application configuration management.
//!
//! Configuration is layered with the `config` crate: built-in defaults, an
//! optional TOML file, then `HEADCOUNT__SECTION__KEY` environment variables.
//! CLI overrides are applied on top by the caller.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "headcount-monitor.toml";

/// Prefix for environment overrides, e.g. `HEADCOUNT__SERVICE__POLL_INTERVAL_MS`
pub const ENV_PREFIX: &str = "HEADCOUNT";

/// Top-level application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub dashboard: DashboardConfig,
    pub storage: StorageConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

/// Session polling and connectivity configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL the fixed catalog's ports are appended to
    pub catalog_host: String,
    pub poll_interval_ms: u64,
    /// Consecutive failed fetches before a sensor is marked offline
    pub failure_threshold: u32,
    pub request_timeout_ms: u64,
    /// Probe the stream endpoint once when a session starts
    pub probe_liveness: bool,
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

/// Terminal dashboard configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub page_size: usize,
    pub refresh_ms: u64,
    /// Head-count samples kept per sensor for the history chart
    pub history_len: usize,
}

/// Durable storage configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

/// CSV export configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub colored: bool,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

/// Static credentials for the dashboard login gate.
///
/// When either field is missing the gate is open.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            catalog_host: "http://10.1.40.46".to_string(),
            poll_interval_ms: 1000,
            failure_threshold: 3,
            request_timeout_ms: 5000,
            probe_liveness: true,
            auto_reconnect: true,
            reconnect_delay_ms: 5000,
            max_reconnect_delay_ms: 60000,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page_size: 4,
            refresh_ms: 250,
            history_len: 120,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("headcount-monitor.json"),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            colored: true,
            json: false,
        }
    }
}

impl ServiceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AuthConfig {
    /// Configured credentials, if the gate is enabled
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// An explicitly given path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let settings = config::Config::builder()
            .add_source(config::File::from(file).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(ConfigError::Load)?;

        let config: AppConfig = settings.try_deserialize().map_err(ConfigError::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.service.poll_interval_ms == 0 {
            return Err(invalid("service.poll_interval_ms", "must be greater than 0"));
        }

        if self.service.failure_threshold == 0 {
            return Err(invalid("service.failure_threshold", "must be greater than 0"));
        }

        if self.service.request_timeout_ms == 0 {
            return Err(invalid("service.request_timeout_ms", "must be greater than 0"));
        }

        if self.service.reconnect_delay_ms > self.service.max_reconnect_delay_ms {
            return Err(invalid(
                "service.reconnect_delay_ms",
                "cannot exceed service.max_reconnect_delay_ms",
            ));
        }

        if self.service.catalog_host.trim().is_empty() {
            return Err(invalid("service.catalog_host", "cannot be empty"));
        }

        if self.dashboard.page_size == 0 {
            return Err(invalid("dashboard.page_size", "must be greater than 0"));
        }

        if self.dashboard.refresh_ms == 0 {
            return Err(invalid("dashboard.refresh_ms", "must be greater than 0"));
        }

        Ok(())
    }

    /// Apply CLI argument overrides to configuration
    pub fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(interval) = cli.poll_interval_ms {
            self.service.poll_interval_ms = interval;
        }

        if let Some(storage) = &cli.storage {
            self.storage.path = storage.clone();
        }

        if let Some(level) = cli.log_level {
            self.logging.level = level.to_filter_string().to_string();
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self).map_err(ConfigError::Render)?)
    }
}

fn invalid(field: &str, message: &str) -> crate::error::AppError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.service.poll_interval_ms, 1000);
        assert_eq!(config.service.failure_threshold, 3);
        assert_eq!(config.dashboard.page_size, 4);
        assert!(config.auth.credentials().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = AppConfig::default();
        config.service.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_failure_threshold() {
        let mut config = AppConfig::default();
        config.service.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_reconnect_delay_above_max() {
        let mut config = AppConfig::default();
        config.service.reconnect_delay_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_catalog_host() {
        let mut config = AppConfig::default();
        config.service.catalog_host = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[service]\npoll_interval_ms = 2000\n\n[auth]\nusername = \"ops\"\npassword = \"secret\""
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.service.poll_interval_ms, 2000);
        assert_eq!(config.service.failure_threshold, 3);
        assert_eq!(config.auth.credentials(), Some(("ops", "secret")));
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[dashboard]\npage_size = 0").unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_to_toml_contains_sections() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[service]"));
        assert!(rendered.contains("poll_interval_ms = 1000"));
    }
}
