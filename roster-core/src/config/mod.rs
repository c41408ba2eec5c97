//! Configuration management for Roster
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `ROSTER_<SECTION>_<KEY>` environment overrides. Every entry point
//! finishes with [`Config::validate`].

use crate::core_access::token::MIN_TOKEN_BYTES;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Access-control policy knobs
    pub access: AccessConfig,

    /// Store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Access-control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Expiry used when a caller does not pass one
    pub default_link_expiry_days: u32,

    /// Upper bound on requested expiry
    pub max_link_expiry_days: u32,

    /// Random bytes per join token
    pub token_bytes: usize,

    /// Attempts to find an unused token before giving up
    pub token_attempts: u32,

    /// Reload-and-reapply attempts after a stale-version save
    pub max_save_retries: u32,

    /// Longest wait for a conversation lock
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,

    /// Count a join by an already-active participant against the usage limit
    pub count_rejoins: bool,

    /// Base URL used to build shareable join links
    pub share_base_url: String,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Connection pool size
    pub pool_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            default_link_expiry_days: 7,
            max_link_expiry_days: 365,
            token_bytes: 32,
            token_attempts: 5,
            max_save_retries: 3,
            lock_timeout: Duration::from_secs(5),
            count_rejoins: true,
            share_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/roster.db"),
            pool_size: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn env_parse<T>(key: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = env::var(key) {
        *target = raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e)))?;
    }
    Ok(())
}

impl Config {
    /// Load configuration from environment variables on top of defaults
    ///
    /// Example: `ROSTER_ACCESS_LOCK_TIMEOUT=2s`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ROSTER_*` environment overrides in place
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let access = &mut self.access;
        env_parse("ROSTER_ACCESS_DEFAULT_LINK_EXPIRY_DAYS", &mut access.default_link_expiry_days)?;
        env_parse("ROSTER_ACCESS_MAX_LINK_EXPIRY_DAYS", &mut access.max_link_expiry_days)?;
        env_parse("ROSTER_ACCESS_TOKEN_BYTES", &mut access.token_bytes)?;
        env_parse("ROSTER_ACCESS_TOKEN_ATTEMPTS", &mut access.token_attempts)?;
        env_parse("ROSTER_ACCESS_MAX_SAVE_RETRIES", &mut access.max_save_retries)?;
        env_parse("ROSTER_ACCESS_COUNT_REJOINS", &mut access.count_rejoins)?;
        if let Ok(raw) = env::var("ROSTER_ACCESS_LOCK_TIMEOUT") {
            access.lock_timeout = humantime_serde::re::humantime::parse_duration(&raw)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid lock timeout: {}", e)))?;
        }
        if let Ok(url) = env::var("ROSTER_ACCESS_SHARE_BASE_URL") {
            access.share_base_url = url;
        }

        if let Ok(path) = env::var("ROSTER_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        env_parse("ROSTER_STORE_POOL_SIZE", &mut self.store.pool_size)?;

        if let Ok(level) = env::var("ROSTER_LOG_LEVEL") {
            self.logging.level = level;
        }
        env_parse("ROSTER_LOG_JSON", &mut self.logging.json_format)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let access = &self.access;

        if access.token_bytes < MIN_TOKEN_BYTES {
            return Err(ConfigError::ValidationFailed(format!(
                "token_bytes must be at least {}",
                MIN_TOKEN_BYTES
            )));
        }

        if access.token_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "token_attempts must be greater than 0".to_string(),
            ));
        }

        if access.default_link_expiry_days > access.max_link_expiry_days {
            return Err(ConfigError::ValidationFailed(
                "default_link_expiry_days exceeds max_link_expiry_days".to_string(),
            ));
        }

        if access.lock_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "lock_timeout must be greater than 0".to_string(),
            ));
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
