//! Configuration loading

use anyhow::{Context, Result};
use cacheguard_core::{GuardConfig, LockConfig};
use cacheguard_store::RedisStoreConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub eviction: EvictionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub lock: LockSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub response_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_timeout_secs: default_timeout_secs(),
            response_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Eviction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Glob of keys that may be evicted under memory pressure
    #[serde(default = "default_key_pattern")]
    pub key_pattern: String,
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound for each store call during a sweep
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            key_pattern: default_key_pattern(),
            threshold_percent: default_threshold_percent(),
            batch_size: default_batch_size(),
            operation_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Watch-mode schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Sweep lease configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_lock_key")]
    pub key: String,
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            key: default_lock_key(),
            ttl_secs: default_lock_ttl_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(String),
    /// The file was absent
    Defaults(String),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "Loaded configuration from {}", path),
            ConfigSource::Defaults(path) => {
                write!(f, "Config file not found at {}, using defaults", path)
            }
        }
    }
}

/// Smallest interval accepted for watch mode
const MIN_INTERVAL_SECS: u64 = 1;

// Default value functions
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_key_pattern() -> String {
    "cache:*".to_string()
}

fn default_threshold_percent() -> f64 {
    80.0
}

fn default_batch_size() -> usize {
    100
}

fn default_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_lock_key() -> String {
    "cacheguard:lock".to_string()
}

fn default_lock_ttl_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a file
    ///
    /// Runs before logging is set up, so the source is returned for the
    /// caller to log.
    pub fn load(path: &str) -> Result<(Self, ConfigSource)> {
        let config_path = Path::new(path);

        // Check if config file exists
        if !config_path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_string())));
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok((config, ConfigSource::File(path.to_string())))
    }

    /// Settings for the guardian
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            key_pattern: self.eviction.key_pattern.clone(),
            threshold_percent: self.eviction.threshold_percent,
            batch_size: self.eviction.batch_size,
            operation_timeout: Duration::from_secs(self.eviction.operation_timeout_secs),
        }
    }

    /// Settings for the Redis connection
    pub fn store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            url: self.redis.url.clone(),
            connect_timeout: Duration::from_secs(self.redis.connect_timeout_secs),
            response_timeout: Duration::from_secs(self.redis.response_timeout_secs),
        }
    }

    /// Lease settings, if exclusive sweeps are enabled
    pub fn lock_config(&self) -> Option<LockConfig> {
        self.lock.enabled.then(|| LockConfig {
            name: self.lock.key.clone(),
            ttl: Duration::from_secs(self.lock.ttl_secs),
        })
    }

    /// Watch interval, clamped to the minimum
    pub fn interval(&self) -> Duration {
        let secs = if self.schedule.interval_secs < MIN_INTERVAL_SECS {
            warn!(
                "interval_secs {} is below minimum {}, using minimum",
                self.schedule.interval_secs, MIN_INTERVAL_SECS
            );
            MIN_INTERVAL_SECS
        } else {
            self.schedule.interval_secs
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let (config, source) = Config::load(path.to_str().unwrap()).unwrap();
        assert!(matches!(source, ConfigSource::Defaults(_)));
        assert!(source.to_string().contains("using defaults"));

        let guard = config.guard_config();
        assert_eq!(guard, GuardConfig::default());
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert!(config.lock_config().is_none());
        assert_eq!(config.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[redis]
url = "redis://cache.internal:6380/2"

[eviction]
key_pattern = "notes:cache:*"
threshold_percent = 90

[lock]
enabled = true
"#
        )
        .unwrap();

        let (config, source) = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(
            source,
            ConfigSource::File(file.path().to_str().unwrap().to_string())
        );

        assert_eq!(config.redis.url, "redis://cache.internal:6380/2");
        assert_eq!(config.redis.connect_timeout_secs, 5);

        let guard = config.guard_config();
        assert_eq!(guard.key_pattern, "notes:cache:*");
        assert_eq!(guard.threshold_percent, 90.0);
        assert_eq!(guard.batch_size, 100);

        let lock = config.lock_config().unwrap();
        assert_eq!(lock.name, "cacheguard:lock");
        assert_eq!(lock.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[eviction]\nbatch_size = \"lots\"").unwrap();

        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_interval_is_clamped() {
        let mut config = Config::default();
        config.schedule.interval_secs = 0;
        assert_eq!(config.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_store_config_mapping() {
        let mut config = Config::default();
        config.redis.response_timeout_secs = 2;
        let store = config.store_config();
        assert_eq!(store.response_timeout, Duration::from_secs(2));
        assert_eq!(store.connect_timeout, Duration::from_secs(5));
    }
}
