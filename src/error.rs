//! Error types for the library seams.
//!
//! Only cache and reference-data errors are allowed to halt a run; provider errors are
//! absorbed by the resolver and turned into a lower tier.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the persistent geocode cache
#[derive(Error, Debug)]
pub enum CacheError {
    /// The store exists but could not be read
    #[error("failed to read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store exists but is not a valid cache document
    #[error("cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The store could not be written back
    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors while loading administrative reference data
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("failed to read reference file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse reference data ({origin}): {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid reference data: {0}")]
    Invalid(String),
}

/// Failures of a single external geocoding call
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Transport(_) => true,
            ProviderError::Status(code) => *code == 429 || *code >= 500,
            ProviderError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Transport(err)
        }
    }
}

/// Invalid configuration values
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("provider.interval_ms must be between {min} and {max}, got {value}")]
    IntervalOutOfRange { value: u64, min: u64, max: u64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid provider url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::Status(503).is_transient());
        assert!(ProviderError::Status(429).is_transient());
        assert!(!ProviderError::Status(404).is_transient());
        assert!(!ProviderError::Malformed("x".into()).is_transient());
    }
}
