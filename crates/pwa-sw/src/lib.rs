//! # PWA Service Worker
//!
//! Offline cache worker for the PWA shell.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate with old-cache cleanup and client claim
//! - **Cache API**: named buckets keyed by request identity
//! - **Fetch interception**: cache first, network fallback, offline fallback
//! - **Push**: JSON payloads rendered with per-field defaults
//! - **Notification clicks**: focus or open the matching window
//! - **Event host**: every platform event is a task with an awaited reply
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer (page side)
//!     │
//!     ├── ServiceWorkerRegistration
//!     │       ├── installing / waiting / active (ServiceWorker)
//!     │       └── scope
//!     │
//!     └── WorkerHandle ── mpsc ──→ WorkerHost ──→ OfflineWorker
//!                                      └── JoinSet (fetch, push, click, sync)
//!
//! CacheStorage
//!     └── Cache (name = version)
//!             └── (method, url) → Response
//! ```

use pwa_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod container;
pub mod host;
pub mod lifecycle;
pub mod notification;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheKey, CacheStorage};
pub use clients::{Client, ClientId, ClientMatchOptions, ClientType, Clients};
pub use container::{ContainerEvent, ServiceWorkerContainer};
pub use host::{WorkerHandle, WorkerHost};
pub use lifecycle::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
pub use notification::{
    route_for, Notification, NotificationId, NotificationOptions, NotificationShelf,
    NotificationSink, PushMessage,
};
pub use worker::{ActivateOutcome, ClickOutcome, OfflineWorker, SyncOutcome};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceWorkerError {
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Worker host has shut down")]
    HostClosed,
}

impl From<NetError> for ServiceWorkerError {
    fn from(err: NetError) -> Self {
        Self::NetworkError(err.to_string())
    }
}
