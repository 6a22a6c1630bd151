//! Page-side entry point (`navigator.serviceWorker`).

use std::sync::Arc;

use pwa_common::WorkerConfig;
use pwa_net::{Fetcher, Request, Response};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::{Client, ClientId, Clients};
use crate::host::{WorkerHandle, WorkerHost};
use crate::lifecycle::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
use crate::notification::{Notification, NotificationOptions, NotificationSink};
use crate::worker::OfflineWorker;
use crate::ServiceWorkerError;

/// Events emitted to the page.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerEvent {
    /// A new version started installing.
    UpdateFound { version: String },
    /// A worker changed state.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A client is now controlled by a different worker.
    ControllerChange { client_id: ClientId },
}

/// Owns the shared platform state and the single registration for the origin.
pub struct ServiceWorkerContainer {
    origin: Url,
    registration: RwLock<ServiceWorkerRegistration>,
    waiting: RwLock<Option<WorkerHandle>>,
    active: RwLock<Option<WorkerHandle>>,
    caches: CacheStorage,
    clients: Arc<RwLock<Clients>>,
    fetcher: Arc<dyn Fetcher>,
    notifications: Arc<dyn NotificationSink>,
    event_tx: mpsc::UnboundedSender<ContainerEvent>,
}

impl ServiceWorkerContainer {
    /// Create a new container scoped to the origin root.
    pub fn new(
        origin: Url,
        fetcher: Arc<dyn Fetcher>,
        notifications: Arc<dyn NotificationSink>,
    ) -> (Self, mpsc::UnboundedReceiver<ContainerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut scope = origin.clone();
        scope.set_path("/");
        scope.set_query(None);
        scope.set_fragment(None);

        (
            Self {
                origin: scope.clone(),
                registration: RwLock::new(ServiceWorkerRegistration::new(scope)),
                waiting: RwLock::new(None),
                active: RwLock::new(None),
                caches: CacheStorage::new(),
                clients: Arc::new(RwLock::new(Clients::new())),
                fetcher,
                notifications,
                event_tx,
            },
            event_rx,
        )
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    pub fn clients(&self) -> &Arc<RwLock<Clients>> {
        &self.clients
    }

    /// Snapshot of the registration.
    pub async fn registration(&self) -> ServiceWorkerRegistration {
        self.registration.read().await.clone()
    }

    fn emit(&self, event: ContainerEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, worker_id: ServiceWorkerId, new_state: ServiceWorkerState) {
        info!(worker = worker_id.raw(), state = %new_state, "Service worker state changed");
        self.emit(ContainerEvent::StateChange {
            worker_id,
            new_state,
        });
    }

    /// Add a page showing `url`. It is controlled right away if a worker is active.
    pub async fn open_page(&self, url: Url) -> Client {
        let controller = self.active.read().await.as_ref().map(WorkerHandle::id);
        let client = Client {
            controller,
            ..Client::window(url)
        };
        self.clients.write().await.add(client.clone());
        client
    }

    /// Close a page. Returns the client if it was open.
    pub async fn close_page(&self, id: &ClientId) -> Option<Client> {
        let closed = self.clients.write().await.remove(id);
        if closed.is_some() {
            info!(client = %id, "Page closed");
        }
        closed
    }

    /// Install a new worker version and, with `skip_waiting`, activate it.
    pub async fn register(&self, config: WorkerConfig) -> Result<ServiceWorkerId, ServiceWorkerError> {
        config
            .validate()
            .map_err(|e| ServiceWorkerError::RegistrationFailed(e.to_string()))?;

        let skip_waiting = config.skip_waiting;
        let version = config.cache_name.clone();
        let worker = OfflineWorker::new(
            config,
            self.origin.clone(),
            self.caches.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.notifications),
            Arc::clone(&self.clients),
        );
        let id = worker.id();

        self.registration
            .write()
            .await
            .update(ServiceWorker::new(id, version.clone()));
        self.emit(ContainerEvent::UpdateFound {
            version: version.clone(),
        });
        self.set_state(id, ServiceWorkerState::Installing);

        let handle = WorkerHost::spawn(worker);
        if let Err(e) = handle.install().await {
            error!(version = %version, error = %e, "Service worker install failed");
            self.registration.write().await.install_failed(e.to_string());
            self.set_state(id, ServiceWorkerState::Redundant);
            let _ = handle.shutdown().await;
            return Err(e);
        }

        self.registration.write().await.install_complete()?;
        self.set_state(id, ServiceWorkerState::Installed);

        if let Some(previous) = self.waiting.write().await.replace(handle) {
            self.set_state(previous.id(), ServiceWorkerState::Redundant);
            let _ = previous.shutdown().await;
        }

        if skip_waiting {
            self.activate_waiting().await?;
        }
        Ok(id)
    }

    /// Activate the waiting worker, replacing the active one.
    pub async fn activate_waiting(&self) -> Result<ServiceWorkerId, ServiceWorkerError> {
        let handle = self
            .waiting
            .write()
            .await
            .take()
            .ok_or_else(|| ServiceWorkerError::StateError("no waiting worker".to_string()))?;
        let id = handle.id();

        let replaced = self.registration.write().await.start_activation()?;
        self.set_state(id, ServiceWorkerState::Activating);

        match handle.activate().await {
            Ok(outcome) => {
                for client_id in outcome.claimed {
                    self.emit(ContainerEvent::ControllerChange { client_id });
                }
            }
            Err(e) => warn!(error = %e, "Activate handler failed"),
        }

        self.registration.write().await.finish_activation()?;
        self.set_state(id, ServiceWorkerState::Activated);

        let previous = self.active.write().await.replace(handle);
        if let Some(old) = replaced {
            self.set_state(old.id, ServiceWorkerState::Redundant);
        }
        if let Some(previous) = previous {
            let _ = previous.shutdown().await;
        }
        Ok(id)
    }

    /// The active worker, once there is one.
    pub async fn ready(&self) -> Option<WorkerHandle> {
        self.active.read().await.clone()
    }

    /// State of the active worker.
    pub async fn controller_state(&self) -> Option<ServiceWorkerState> {
        self.registration
            .read()
            .await
            .get_active()
            .map(|worker| worker.state)
    }

    /// Fetch from the page: through the active worker, or straight to the network.
    pub async fn fetch(&self, request: Request) -> Result<Response, ServiceWorkerError> {
        match self.ready().await {
            Some(handle) => handle.fetch(request).await,
            None => Ok(self.fetcher.fetch(&request).await?),
        }
    }

    /// `registration.showNotification()`: requires an active worker.
    pub async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<Notification, ServiceWorkerError> {
        if self.ready().await.is_none() {
            return Err(ServiceWorkerError::StateError(
                "no active service worker".to_string(),
            ));
        }
        self.notifications.show(title, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationShelf;
    use async_trait::async_trait;
    use http::HeaderMap;
    use pwa_net::NetError;

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
            Ok(Response::basic(
                request.url.clone(),
                200,
                HeaderMap::new(),
                request.url.path().to_string(),
            ))
        }
    }

    fn container() -> (ServiceWorkerContainer, mpsc::UnboundedReceiver<ContainerEvent>) {
        ServiceWorkerContainer::new(
            Url::parse("https://app.example.com/app?x=1").unwrap(),
            Arc::new(EchoFetcher),
            Arc::new(NotificationShelf::new()),
        )
    }

    #[tokio::test]
    async fn test_register_activates_with_skip_waiting() {
        let (container, mut events) = container();
        assert_eq!(container.origin().as_str(), "https://app.example.com/");

        let id = container.register(WorkerConfig::default()).await.unwrap();

        assert_eq!(container.ready().await.unwrap().id(), id);
        assert_eq!(
            container.controller_state().await,
            Some(ServiceWorkerState::Activated)
        );

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ContainerEvent::StateChange { new_state, .. } = event {
                states.push(new_state);
            }
        }
        assert_eq!(
            states,
            vec![
                ServiceWorkerState::Installing,
                ServiceWorkerState::Installed,
                ServiceWorkerState::Activating,
                ServiceWorkerState::Activated,
            ]
        );
    }

    #[tokio::test]
    async fn test_register_without_skip_waiting_stays_waiting() {
        let (container, _events) = container();
        let config = WorkerConfig {
            skip_waiting: false,
            ..Default::default()
        };
        let id = container.register(config).await.unwrap();

        assert!(container.ready().await.is_none());
        assert_eq!(
            container.registration().await.waiting.unwrap().id,
            id
        );

        container.activate_waiting().await.unwrap();
        assert!(container.ready().await.is_some());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_config() {
        let (container, _events) = container();
        let config = WorkerConfig::default().with_cache_name("");
        assert!(matches!(
            container.register(config).await,
            Err(ServiceWorkerError::RegistrationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_open_page_is_claimed() {
        let (container, mut events) = container();
        let page = container
            .open_page(Url::parse("https://app.example.com/").unwrap())
            .await;
        assert!(page.controller.is_none());

        let id = container.register(WorkerConfig::default()).await.unwrap();

        let clients = container.clients().read().await;
        assert_eq!(clients.get(&page.id).unwrap().controller, Some(id));
        drop(clients);

        let mut changed = false;
        while let Ok(event) = events.try_recv() {
            changed |= event == ContainerEvent::ControllerChange { client_id: page.id.clone() };
        }
        assert!(changed);
    }

    #[tokio::test]
    async fn test_closed_page_is_not_claimed() {
        let (container, mut events) = container();
        let page = container
            .open_page(Url::parse("https://app.example.com/").unwrap())
            .await;

        assert_eq!(container.close_page(&page.id).await.unwrap().id, page.id);
        assert!(container.close_page(&page.id).await.is_none());

        container.register(WorkerConfig::default()).await.unwrap();
        assert!(container.clients().read().await.is_empty());
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, ContainerEvent::ControllerChange { .. }));
        }
    }

    #[tokio::test]
    async fn test_show_notification_requires_active_worker() {
        let (container, _events) = container();
        assert!(container
            .show_notification("Hi", NotificationOptions::default())
            .await
            .is_err());

        container.register(WorkerConfig::default()).await.unwrap();
        let shown = container
            .show_notification("Hi", NotificationOptions::default())
            .await
            .unwrap();
        assert_eq!(shown.title, "Hi");
    }
}
