//! Online/offline status monitor.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Connectivity state shared between the page and the loader.
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
    /// Create a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the state. Subscribers are only woken on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online, "Network status changed");
        }
    }

    /// Receive every subsequent status change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Indicator text shown by the page.
    pub fn label(&self) -> &'static str {
        if self.is_online() {
            "Online"
        } else {
            "Offline"
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}
