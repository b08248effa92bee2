use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::source::MAX_PAGE_SIZE;
use crate::sync::SyncSettings;

pub const DEFAULT_API_URL: &str = "https://ll.thespacedevs.com/2.2.0";

/// One week.
const MAX_LEASE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Remote API and fetch-loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api_url: String,
    /// API token; raises the request allowance when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub page_size: u32,
    pub request_delay_ms: u64,
    pub lookback_hours: u32,
    pub max_retries: u32,
    pub default_cooldown_secs: u64,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// How long a running sync stays claimed without renewing its lease
    pub lease_ttl_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            page_size: MAX_PAGE_SIZE,
            request_delay_ms: 1000,
            lookback_hours: 24,
            max_retries: 5,
            default_cooldown_secs: 60,
            retry_backoff_ms: 2000,
            request_timeout_secs: 30,
            lease_ttl_secs: 300,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            page_size: self.page_size,
            request_delay: Duration::from_millis(self.request_delay_ms),
            lookback: chrono::Duration::hours(i64::from(self.lookback_hours)),
            max_retries: self.max_retries,
            default_cooldown: Duration::from_secs(self.default_cooldown_secs),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            lease_ttl: chrono::Duration::seconds(self.lease_ttl_secs.min(MAX_LEASE_TTL_SECS) as i64),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue(
                "sync.page_size".to_string(),
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        if self.lookback_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.lookback_hours".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.request_timeout_secs".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.lease_ttl_secs == 0 || self.lease_ttl_secs > MAX_LEASE_TTL_SECS {
            return Err(ConfigError::InvalidValue(
                "sync.lease_ttl_secs".to_string(),
                format!("must be between 1 and {}", MAX_LEASE_TTL_SECS),
            ));
        }
        Ok(())
    }

    /// Applies `LAUNCHSYNC_*` overrides for the token and every numeric key.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(token) = var("LAUNCHSYNC_API_TOKEN") {
            self.api_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(page_size) = env_number(&var, "LAUNCHSYNC_PAGE_SIZE")? {
            self.page_size = page_size;
        }
        if let Some(delay) = env_number(&var, "LAUNCHSYNC_REQUEST_DELAY_MS")? {
            self.request_delay_ms = delay;
        }
        if let Some(hours) = env_number(&var, "LAUNCHSYNC_LOOKBACK_HOURS")? {
            self.lookback_hours = hours;
        }
        if let Some(retries) = env_number(&var, "LAUNCHSYNC_MAX_RETRIES")? {
            self.max_retries = retries;
        }
        if let Some(cooldown) = env_number(&var, "LAUNCHSYNC_DEFAULT_COOLDOWN_SECS")? {
            self.default_cooldown_secs = cooldown;
        }
        if let Some(backoff) = env_number(&var, "LAUNCHSYNC_RETRY_BACKOFF_MS")? {
            self.retry_backoff_ms = backoff;
        }
        if let Some(timeout) = env_number(&var, "LAUNCHSYNC_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = timeout;
        }
        if let Some(ttl) = env_number(&var, "LAUNCHSYNC_LEASE_TTL_SECS")? {
            self.lease_ttl_secs = ttl;
        }
        Ok(())
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Base URL of the launch API
    pub api_url: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("launches.db");

        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();
        let mut api_url_source = ConfigSource::Default;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Relative paths are relative to the config file
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                if sync_config.api_url != DEFAULT_API_URL {
                    api_url_source = ConfigSource::File;
                }
                sync = sync_config;
            }
        }

        if let Ok(db_path) = std::env::var("LAUNCHSYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("LAUNCHSYNC_API_URL") {
            sync.api_url = url;
            api_url_source = ConfigSource::Environment;
        }
        sync.apply_env(|key| std::env::var(key).ok())?;

        sync.validate()?;

        Ok(Self {
            database_path,
            api_url: ConfigValue::new(sync.api_url.clone(), api_url_source),
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/launchsync/
    /// - macOS: ~/Library/Application Support/launchsync/
    /// - Windows: %APPDATA%/launchsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("launchsync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/launchsync/
    /// - macOS: ~/Library/Application Support/launchsync/
    /// - Windows: %APPDATA%/launchsync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("launchsync")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn env_number<T: std::str::FromStr>(
    var: impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("'{}' is not a number", value))),
        None => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, reason) => {
                write!(f, "Invalid configuration value for {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
