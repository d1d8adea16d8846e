//! TOML configuration shared by the ingest and serve binaries.
//!
//! Every section has defaults, so an empty file (or no file) is a valid configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Nominatim's usage policy asks for at most one request per second.
pub const MIN_INTERVAL_MS: u64 = 1000;
pub const MAX_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    pub resolver: ResolverConfig,
    pub reference: ReferenceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    /// Flush after this many newly resolved records
    pub flush_every: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("geocode-cache.json"),
            flush_every: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    /// Search endpoint of a Nominatim-compatible geocoder
    pub url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    /// Minimum spacing between two outbound calls, process-wide
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Candidates requested per search
    pub result_limit: u32,
    pub country: String,
    pub country_code: String,
    /// Set to false to run fully offline (dictionary and fallbacks only)
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: "Locus/0.1 (energy registry geocoding)".to_string(),
            timeout_ms: 5000,
            interval_ms: 1100,
            max_attempts: 2,
            retry_backoff_ms: 2000,
            result_limit: 1,
            country: "Polska".to_string(),
            country_code: "pl".to_string(),
            enabled: true,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    /// Resolutions in flight at once; external calls are still serialized by the limiter
    pub concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Optional JSON file extending the embedded reference tables
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Seconds between background cache flushes
    pub flush_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            flush_interval_secs: 30,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.provider.interval_ms;
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval) {
            return Err(ConfigError::IntervalOutOfRange {
                value: interval,
                min: MIN_INTERVAL_MS,
                max: MAX_INTERVAL_MS,
            });
        }
        if self.provider.timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "provider.timeout_ms",
            });
        }
        if self.provider.max_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "provider.max_attempts",
            });
        }
        if self.provider.result_limit == 0 {
            return Err(ConfigError::Zero {
                field: "provider.result_limit",
            });
        }
        if self.resolver.concurrency == 0 {
            return Err(ConfigError::Zero {
                field: "resolver.concurrency",
            });
        }
        if self.cache.flush_every == 0 {
            return Err(ConfigError::Zero {
                field: "cache.flush_every",
            });
        }
        url::Url::parse(&self.provider.url).map_err(|source| ConfigError::Url {
            url: self.provider.url.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.flush_every, 100);
        assert_eq!(config.provider.interval_ms, 1100);
        assert_eq!(config.provider.result_limit, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            interval_ms = 2000
            user_agent = "Test/1.0"

            [cache]
            path = "/tmp/cache.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.provider.interval(), Duration::from_secs(2));
        assert_eq!(config.provider.timeout_ms, 5000);
        assert_eq!(config.cache.path, PathBuf::from("/tmp/cache.json"));
    }

    #[test]
    fn test_interval_bounds_enforced() {
        let mut config = Config::default();
        config.provider.interval_ms = 500;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IntervalOutOfRange { value: 500, .. })
        ));
        config.provider.interval_ms = 2500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.resolver.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "resolver.concurrency"
            })
        ));
    }
}
