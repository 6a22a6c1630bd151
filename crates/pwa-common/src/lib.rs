//! # PWA Common
//!
//! Shared error type, logging setup and configuration for the offline PWA
//! worker runtime.
//!
//! ## Features
//!
//! - Error type for configuration and startup failures
//! - Logging configuration and setup
//! - JSON configuration for the worker, the loader and logging

use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::{
    LoaderSettings, LogSettings, NotificationDefaults, PwaConfig, WorkerConfig, CACHE_NAME,
    OFFLINE_FALLBACK, PERIODIC_SYNC_TAG, PRECACHE_URLS,
};
pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};

/// Error type for loading configuration and setting up the runtime.
#[derive(Error, Debug)]
pub enum PwaError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl PwaError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            PwaError::Config { .. } => "config",
            PwaError::Io(_) => "io",
            PwaError::Json(_) => "json",
            PwaError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_categories() {
        assert_eq!(PwaError::config("origin").category(), "config");
        assert_eq!(
            PwaError::InvalidArgument("level".into()).category(),
            "invalid_argument"
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(PwaError::from(io).category(), "io");
    }

    #[test]
    fn test_config_error_keeps_source() {
        let parsed = "abc".parse::<u32>().unwrap_err();
        let err = PwaError::config_with_source("bad port", parsed);
        assert_eq!(err.to_string(), "Config error: bad port");
        assert!(err.source().is_some());
        assert!(PwaError::config("bad port").source().is_none());
    }
}
