//! Worker versions and the registration that holds them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ServiceWorkerError;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Created, install not started yet.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

impl fmt::Display for ServiceWorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// One version of the worker.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    pub id: ServiceWorkerId,

    /// Cache bucket name this version owns.
    pub version: String,

    pub state: ServiceWorkerState,

    /// Error message if install failed.
    pub error: Option<String>,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    pub fn new(id: ServiceWorkerId, version: impl Into<String>) -> Self {
        Self {
            id,
            version: version.into(),
            state: ServiceWorkerState::Parsed,
            error: None,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

/// A service worker registration.
#[derive(Debug, Clone)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker (activating or activated).
    pub active: Option<ServiceWorker>,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Start installing a new version. Any version still installing is replaced.
    pub fn update(&mut self, mut worker: ServiceWorker) {
        if let Some(mut previous) = self.installing.take() {
            previous.set_state(ServiceWorkerState::Redundant);
        }
        worker.set_state(ServiceWorkerState::Installing);
        self.installing = Some(worker);
    }

    /// Transition installing to waiting. A previously waiting worker becomes redundant.
    pub fn install_complete(&mut self) -> Result<ServiceWorkerId, ServiceWorkerError> {
        let mut worker = self
            .installing
            .take()
            .ok_or_else(|| ServiceWorkerError::StateError("no installing worker".to_string()))?;
        worker.set_state(ServiceWorkerState::Installed);
        let id = worker.id;
        if let Some(mut previous) = self.waiting.replace(worker) {
            previous.set_state(ServiceWorkerState::Redundant);
        }
        Ok(id)
    }

    /// Drop the installing worker after a failed install.
    pub fn install_failed(&mut self, error: impl Into<String>) -> Option<ServiceWorker> {
        let mut worker = self.installing.take()?;
        worker.error = Some(error.into());
        worker.set_state(ServiceWorkerState::Redundant);
        Some(worker)
    }

    /// Promote the waiting worker into the active slot in the activating state.
    ///
    /// Returns the replaced active worker, now redundant.
    pub fn start_activation(&mut self) -> Result<Option<ServiceWorker>, ServiceWorkerError> {
        let mut worker = self
            .waiting
            .take()
            .ok_or_else(|| ServiceWorkerError::StateError("no waiting worker".to_string()))?;
        worker.set_state(ServiceWorkerState::Activating);

        let replaced = self.active.replace(worker).map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        });
        Ok(replaced)
    }

    /// Mark the activating worker as activated.
    pub fn finish_activation(&mut self) -> Result<ServiceWorkerId, ServiceWorkerError> {
        match self.active.as_mut() {
            Some(worker) if worker.state == ServiceWorkerState::Activating => {
                worker.set_state(ServiceWorkerState::Activated);
                Ok(worker.id)
            }
            Some(worker) => Err(ServiceWorkerError::StateError(format!(
                "active worker is {}, not activating",
                worker.state
            ))),
            None => Err(ServiceWorkerError::StateError("no active worker".to_string())),
        }
    }

    /// Get the active worker.
    pub fn get_active(&self) -> Option<&ServiceWorker> {
        self.active.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> ServiceWorkerRegistration {
        ServiceWorkerRegistration::new(Url::parse("https://example.com/").unwrap())
    }

    #[test]
    fn test_service_worker_state_transitions() {
        let mut worker = ServiceWorker::new(ServiceWorkerId::new(), "pwa-cache-v1");
        assert_eq!(worker.state, ServiceWorkerState::Parsed);
        assert!(!worker.is_active());

        worker.set_state(ServiceWorkerState::Activated);
        assert!(worker.is_active());
        assert_eq!(worker.state.to_string(), "activated");
    }

    #[test]
    fn test_registration_lifecycle() {
        let mut registration = registration();
        registration.update(ServiceWorker::new(ServiceWorkerId::new(), "v1"));
        assert_eq!(
            registration.installing.as_ref().unwrap().state,
            ServiceWorkerState::Installing
        );

        registration.install_complete().unwrap();
        assert!(registration.installing.is_none());
        assert_eq!(
            registration.waiting.as_ref().unwrap().state,
            ServiceWorkerState::Installed
        );

        let replaced = registration.start_activation().unwrap();
        assert!(replaced.is_none());
        assert_eq!(
            registration.active.as_ref().unwrap().state,
            ServiceWorkerState::Activating
        );

        registration.finish_activation().unwrap();
        assert!(registration.get_active().unwrap().is_active());
        assert!(registration.waiting.is_none());
    }

    #[test]
    fn test_new_version_replaces_active() {
        let mut registration = registration();
        registration.update(ServiceWorker::new(ServiceWorkerId::new(), "v1"));
        registration.install_complete().unwrap();
        registration.start_activation().unwrap();
        registration.finish_activation().unwrap();

        registration.update(ServiceWorker::new(ServiceWorkerId::new(), "v2"));
        registration.install_complete().unwrap();
        let replaced = registration.start_activation().unwrap().unwrap();

        assert_eq!(replaced.version, "v1");
        assert!(replaced.is_redundant());
        assert_eq!(registration.active.as_ref().unwrap().version, "v2");
    }

    #[test]
    fn test_install_failure_marks_redundant() {
        let mut registration = registration();
        registration.update(ServiceWorker::new(ServiceWorkerId::new(), "v1"));

        let failed = registration.install_failed("precache failed").unwrap();
        assert!(failed.is_redundant());
        assert_eq!(failed.error.as_deref(), Some("precache failed"));
        assert!(registration.installing.is_none());
        assert!(registration.install_complete().is_err());
    }

    #[test]
    fn test_activation_requires_waiting_worker() {
        let mut registration = registration();
        assert!(matches!(
            registration.start_activation(),
            Err(ServiceWorkerError::StateError(_))
        ));
        assert!(registration.finish_activation().is_err());
    }
}
