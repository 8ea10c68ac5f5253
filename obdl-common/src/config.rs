//! Configuration loading and resolution
//!
//! Settings are resolved per field in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the client logs a warning and
//! starts with defaults. A config file that exists but does not parse is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "OBDL_CONFIG";
/// Environment variable overriding the feed base URL
pub const ENV_FEED_URL: &str = "OBDL_FEED_URL";
/// Environment variable overriding the poll interval (milliseconds)
pub const ENV_POLL_INTERVAL_MS: &str = "OBDL_POLL_INTERVAL_MS";
/// Environment variable overriding the state directory
pub const ENV_STATE_DIR: &str = "OBDL_STATE_DIR";

/// Application directory name under the platform config/data directories
const APP_DIR: &str = "obd-logger";

/// Config file name inside the application config directory
const CONFIG_FILE: &str = "feed.toml";

/// TOML config file contents
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the backend serving `/events` and `/plots`
    pub feed_url: Option<String>,
    /// Poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,
    /// Timeout for one `GET /events` attempt in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// Timeout for one `DELETE /events/remove/{key}` attempt in milliseconds
    pub delete_timeout_ms: Option<u64>,
    /// Directory holding the persisted override maps
    pub state_dir: Option<PathBuf>,
    /// Directory receiving downloaded artifact images
    pub artifact_dir: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[retry]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

/// `[logging]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing level (trace, debug, info, warn, error)
    pub level: Option<String>,
}

/// Compiled defaults used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub feed_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub delete_timeout: Duration,
    pub retry: RetrySettings,
    pub state_dir: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            feed_url: "http://127.0.0.1:7860".to_string(),
            poll_interval: Duration::from_millis(5000),
            request_timeout: Duration::from_millis(10_000),
            delete_timeout: Duration::from_millis(5000),
            retry: RetrySettings::default(),
            state_dir: default_state_dir(),
            log_level: "info".to_string(),
        }
    }
}

/// Retry policy parameters for feed requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts including the first one (always >= 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(2000),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub feed_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub state_dir: Option<PathBuf>,
}

/// Fully resolved client settings
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub feed_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub delete_timeout: Duration,
    pub retry: RetrySettings,
    pub state_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub log_level: String,
}

impl FeedSettings {
    /// Resolve settings from CLI, environment, TOML and compiled defaults
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let feed_url = cli
            .feed_url
            .clone()
            .or_else(|| std::env::var(ENV_FEED_URL).ok())
            .or_else(|| toml.feed_url.clone())
            .unwrap_or(defaults.feed_url);

        let poll_interval_ms = match cli.poll_interval_ms {
            Some(ms) => Some(ms),
            None => env_u64(ENV_POLL_INTERVAL_MS)?,
        }
        .or(toml.poll_interval_ms);
        let poll_interval = poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let state_dir = cli
            .state_dir
            .clone()
            .or_else(|| std::env::var(ENV_STATE_DIR).ok().map(PathBuf::from))
            .or_else(|| toml.state_dir.clone())
            .unwrap_or(defaults.state_dir);

        let artifact_dir = toml
            .artifact_dir
            .clone()
            .unwrap_or_else(|| state_dir.join("plots"));

        let retry = RetrySettings {
            max_attempts: toml.retry.max_attempts.unwrap_or(defaults.retry.max_attempts),
            initial_backoff: toml
                .retry
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_backoff),
            max_backoff: toml
                .retry
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_backoff),
        };

        let settings = Self {
            feed_url: feed_url.trim_end_matches('/').to_string(),
            poll_interval,
            request_timeout: toml
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            delete_timeout: toml
                .delete_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delete_timeout),
            retry,
            state_dir,
            artifact_dir,
            log_level: toml.logging.level.clone().unwrap_or(defaults.log_level),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the polling loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.feed_url.trim().is_empty() {
            return Err(Error::Config("feed_url must not be empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(Error::Config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be an integer, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Locate the config file: explicit path, then `OBDL_CONFIG`, then the
/// platform config directory (`~/.config/obd-logger/feed.toml` on Linux)
pub fn config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}

/// Load the TOML config, treating a missing file as empty
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// OS-dependent default state directory
fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./obd_logger_data"))
}
