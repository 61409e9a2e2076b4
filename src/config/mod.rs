//! Configuration management for the wenku backend
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Policy for scrape errors during bulk catalog discovery.
///
/// The two behaviors both shipped at different times; which one is wanted
/// depends on how noisy the source currently is, so it stays configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverErrorPolicy {
    /// Log the failing id and continue the walk
    #[default]
    SkipAndContinue,
    /// Abort the whole walk on the first scrape error
    Abort,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Outbound HTTP client configuration
    pub client: ClientConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration (lock, keywords, summary cache)
    pub redis: RedisConfig,

    /// Per-source site configuration
    pub sources: SourcesConfig,

    /// Sync and discovery behavior
    pub sync: SyncConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum number of concurrent requests
    pub max_concurrent_requests: usize,

    /// Rate limit (requests per second)
    pub rate_limit: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum retry attempts per request
    pub max_retries: u32,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Busy timeout for contended writes, in seconds
    pub busy_timeout_secs: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Key prefix for namespacing
    pub key_prefix: String,
}

/// Per-source site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub biquge: SourceSiteConfig,
    pub qidian: SourceSiteConfig,
}

/// Configuration for a single source site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSiteConfig {
    /// Base URL of the site
    pub base_url: String,
}

/// Sync and discovery behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lowest source-native id the discovery walk may start from
    pub discover_floor: i64,

    /// Highest source-native id the discovery walk goes up to
    pub discover_max: i64,

    /// What to do when a single id fails to scrape during discovery
    pub discover_error_policy: DiscoverErrorPolicy,

    /// Detail page cache capacity (entries)
    pub detail_cache_capacity: usize,

    /// Detail page cache TTL in seconds
    pub detail_cache_ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("WENKU_MAX_CONCURRENT_REQUESTS") {
            config.client.max_concurrent_requests = v;
        }
        if let Some(v) = env_parse::<u32>("WENKU_RATE_LIMIT") {
            config.client.rate_limit = v;
        }
        if let Some(v) = env_parse::<u64>("WENKU_REQUEST_TIMEOUT") {
            config.client.request_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("WENKU_SQLITE_PATH") {
            config.database.sqlite_path = v.into();
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            config.redis.url = v;
        }
        if let Ok(v) = std::env::var("WENKU_BIQUGE_BASE_URL") {
            config.sources.biquge.base_url = v;
        }
        if let Ok(v) = std::env::var("WENKU_QIDIAN_BASE_URL") {
            config.sources.qidian.base_url = v;
        }
        if let Some(v) = env_parse::<i64>("WENKU_DISCOVER_MAX") {
            config.sync.discover_max = v;
        }
        if let Ok(v) = std::env::var("WENKU_DISCOVER_ERROR_POLICY") {
            config.sync.discover_error_policy = match v.as_str() {
                "abort" => DiscoverErrorPolicy::Abort,
                _ => DiscoverErrorPolicy::SkipAndContinue,
            };
        }
        if let Ok(v) = std::env::var("WENKU_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WENKU_LOG_FORMAT") {
            config.logging.format = v;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.client.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }

        if self.client.rate_limit == 0 {
            anyhow::bail!("rate_limit must be greater than 0");
        }

        if self.redis.pool_size == 0 {
            anyhow::bail!("redis pool_size must be greater than 0");
        }

        if self.sync.discover_max <= self.sync.discover_floor {
            anyhow::bail!("discover_max must be greater than discover_floor");
        }

        if self.sync.detail_cache_capacity == 0 {
            anyhow::bail!("detail_cache_capacity must be greater than 0");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.client.request_timeout_secs)
    }

    /// Get detail cache TTL as Duration
    #[must_use]
    pub fn detail_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.sync.detail_cache_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig {
                max_concurrent_requests: 10,
                rate_limit: 2,
                request_timeout_secs: 30,
                max_retries: 3,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/wenku.db"),
                busy_timeout_secs: 3,
            },
            redis: RedisConfig {
                url: String::from("redis://localhost:6379"),
                pool_size: 10,
                key_prefix: String::from("wenku"),
            },
            sources: SourcesConfig {
                biquge: SourceSiteConfig {
                    base_url: String::from("https://www.biquge.com"),
                },
                qidian: SourceSiteConfig {
                    base_url: String::from("https://www.qidian.com"),
                },
            },
            sync: SyncConfig {
                discover_floor: 0,
                discover_max: 50_000,
                discover_error_policy: DiscoverErrorPolicy::SkipAndContinue,
                detail_cache_capacity: 50,
                detail_cache_ttl_secs: 300,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_concurrent_requests() {
        let mut config = Config::default();
        config.client.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_discover_range() {
        let mut config = Config::default();
        config.sync.discover_max = config.sync.discover_floor;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.detail_cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_discover_error_policy_default() {
        assert_eq!(
            DiscoverErrorPolicy::default(),
            DiscoverErrorPolicy::SkipAndContinue
        );
    }
}
