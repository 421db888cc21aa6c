//! Application configuration.

use crate::error::{AppError, AppResult};
use config::{Config, Environment, File};
use mandi_alerts::{FcmConfig, SweepConfig};
use mandi_api::ApiConfig;
use mandi_feed::FeedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `MANDI__FEED__API_KEY`.
pub const ENV_PREFIX: &str = "MANDI";

/// Env var naming the config file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "MANDI_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Push delivery backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherKind {
    /// Log notifications instead of sending them.
    #[default]
    Log,
    Fcm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_sweep_enabled")]
    pub sweep_enabled: bool,
    /// Seconds between scheduled sweeps. Default: 3600.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub dispatcher: DispatcherKind,
    #[serde(default)]
    pub fcm: FcmConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            sweep_enabled: default_sweep_enabled(),
            sweep_interval_secs: default_sweep_interval_secs(),
            dispatcher: DispatcherKind::default(),
            fcm: FcmConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Scheduled archive sync of the previous day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub schedule_enabled: bool,
    /// Default: 86400 (daily).
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    /// State synced when a request names none.
    #[serde(default = "default_sync_state")]
    pub default_state: String,
}

fn default_sync_interval_secs() -> u64 {
    86_400
}

fn default_sync_state() -> String {
    "Gujarat".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schedule_enabled: false,
            interval_secs: default_sync_interval_secs(),
            default_state: default_sync_state(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Journal directory. Empty keeps everything in memory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn is_persistent(&self) -> bool {
        !self.data_dir.trim().is_empty()
    }

    pub fn journal_path(&self, file: &str) -> PathBuf {
        Path::new(&self.data_dir).join(file)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Pick the config path: explicit argument, then `MANDI_CONFIG`, then the default.
    pub fn resolve_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load `path` (optional) layered with `MANDI__*` environment overrides.
    pub fn load(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            tracing::warn!(path = %path, "Config file not found, using defaults");
        }

        let config: Self = Config::builder()
            .add_source(File::from(Path::new(path)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file only, without environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.alerts.sweep_enabled && self.alerts.sweep_interval_secs == 0 {
            return Err(AppError::Config(
                "alerts.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.sync.schedule_enabled && self.sync.interval_secs == 0 {
            return Err(AppError::Config(
                "sync.interval_secs must be positive".to_string(),
            ));
        }
        if self.alerts.dispatcher == DispatcherKind::Fcm && self.alerts.fcm.server_key.is_empty() {
            return Err(AppError::Config(
                "alerts.fcm.server_key is required for the fcm dispatcher".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.api_prefix(), "/api/v1");
        assert!(config.alerts.sweep_enabled);
        assert_eq!(config.alerts.sweep_interval_secs, 3600);
        assert_eq!(config.alerts.dispatcher, DispatcherKind::Log);
        assert_eq!(config.alerts.sweep.state, "Gujarat");
        assert_eq!(config.storage.data_dir, "data");
        assert!(!config.sync.schedule_enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
[server]
port = 8080

[alerts]
sweep_interval_secs = 600

[alerts.sweep]
state = "Maharashtra"
"#,
        );

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.api_version, "v1");
        assert_eq!(config.alerts.sweep_interval_secs, 600);
        assert_eq!(config.alerts.sweep.state, "Maharashtra");
        assert_eq!(config.alerts.sweep.record_limit, 2000);
        assert_eq!(config.feed.timeout_secs, 10);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("/nonexistent/mandi.toml").unwrap();
        assert_eq!(config.alerts.sweep.state, "Gujarat");
    }

    #[test]
    fn test_load_reads_file() {
        let file = write_config(
            r#"
[storage]
data_dir = ""

[sync]
default_state = "Punjab"
"#,
        );

        let config = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        assert!(!config.storage.is_persistent());
        assert_eq!(config.sync.default_state, "Punjab");
    }

    #[test]
    fn test_fcm_requires_server_key() {
        let file = write_config(
            r#"
[alerts]
dispatcher = "fcm"
"#,
        );

        let err = AppConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = AppConfig::default();
        config.alerts.sweep_interval_secs = 0;
        assert!(config.validate().is_err());

        config.alerts.sweep_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        assert_eq!(
            AppConfig::resolve_path(Some("custom.toml".to_string())),
            "custom.toml"
        );
    }

    #[test]
    fn test_journal_path() {
        let storage = StorageConfig {
            data_dir: "/var/lib/mandi".to_string(),
        };
        assert_eq!(
            storage.journal_path("alerts.jsonl"),
            PathBuf::from("/var/lib/mandi/alerts.jsonl")
        );
    }
}
