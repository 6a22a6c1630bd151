//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::logging::LogFormat;
use crate::PwaError;

/// Name of the cache bucket owned by the current worker version.
pub const CACHE_NAME: &str = "pwa-cache-v1";

/// Shell resources stored on install.
pub const PRECACHE_URLS: [&str; 5] = [
    "/",
    "/index.html",
    "/manifest.json",
    "/icon-192x192.png",
    "/icon-512x512.png",
];

/// Document served to navigations when the network is unreachable.
pub const OFFLINE_FALLBACK: &str = "/index.html";

/// Tag of the periodic sync registration the worker answers.
pub const PERIODIC_SYNC_TAG: &str = "content-sync";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PwaConfig {
    /// Origin the page and its worker are served from
    pub origin: Url,

    /// Worker settings
    pub worker: WorkerConfig,

    /// HTTP loader settings
    pub loader: LoaderSettings,

    /// Logging settings
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cache bucket name; changing it invalidates every older bucket
    pub cache_name: String,

    /// Paths fetched and stored during install
    pub precache: Vec<String>,

    /// Path served to failed navigations
    pub offline_fallback: String,

    /// Activate as soon as install completes
    pub skip_waiting: bool,

    /// Periodic sync tag
    pub periodic_sync_tag: String,

    /// Defaults applied to push notifications
    pub notifications: NotificationDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// User agent string
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum redirects followed
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub filter: Option<String>,
}

impl Default for PwaConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:5173/").expect("static origin is valid"),
            worker: WorkerConfig::default(),
            loader: LoaderSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            precache: PRECACHE_URLS.iter().map(|p| p.to_string()).collect(),
            offline_fallback: OFFLINE_FALLBACK.to_string(),
            skip_waiting: true,
            periodic_sync_tag: PERIODIC_SYNC_TAG.to_string(),
            notifications: NotificationDefaults::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "New Notification".to_string(),
            body: "Something new happened!".to_string(),
            icon: "/icon-192x192.png".to_string(),
            badge: "/icon-192x192.png".to_string(),
            tag: "default-notification".to_string(),
            vibrate: vec![200, 100, 200],
        }
    }
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("pwa-demo/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_redirects: 10,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            filter: None,
        }
    }
}

impl WorkerConfig {
    /// Worker config for a different cache version, keeping everything else.
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), PwaError> {
        if self.cache_name.trim().is_empty() {
            return Err(PwaError::config("worker.cache_name must not be empty"));
        }
        if let Some(bad) = self.precache.iter().find(|p| !p.starts_with('/')) {
            return Err(PwaError::config(format!(
                "precache path '{bad}' must be absolute"
            )));
        }
        if !self.offline_fallback.starts_with('/') {
            return Err(PwaError::config("worker.offline_fallback must be absolute"));
        }
        Ok(())
    }
}

impl PwaConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, PwaError> {
        let raw = std::fs::read_to_string(path)?;
        let config: PwaConfig = serde_json::from_str(&raw).map_err(|e| {
            PwaError::config_with_source(format!("invalid config {}", path.display()), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PwaError> {
        match self.origin.scheme() {
            "http" | "https" => {}
            other => {
                return Err(PwaError::config(format!(
                    "origin scheme '{other}' is not http(s)"
                )))
            }
        }
        self.worker.validate()
    }
}
