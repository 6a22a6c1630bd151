//! Event handlers of the offline cache worker.

use std::sync::Arc;

use bytes::Bytes;
use pwa_common::WorkerConfig;
use pwa_net::{Fetcher, Request, Response, ResponseType};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::{Client, ClientMatchOptions, ClientType, Clients};
use crate::lifecycle::ServiceWorkerId;
use crate::notification::{route_for, Notification, NotificationSink, PushMessage};
use crate::ServiceWorkerError;

/// Result of the activate handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivateOutcome {
    /// Buckets removed because they belong to another version.
    pub deleted_caches: Vec<String>,
    /// Clients that switched to this worker.
    pub claimed: Vec<crate::clients::ClientId>,
}

/// Result of a notification click.
#[derive(Debug, Clone)]
pub enum ClickOutcome {
    /// An existing window already showed the route.
    Focused(Client),
    /// A new window was opened on the route.
    Opened(Client),
}

impl ClickOutcome {
    pub fn client(&self) -> &Client {
        match self {
            Self::Focused(c) | Self::Opened(c) => c,
        }
    }
}

/// Result of a periodic sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Acknowledged,
    Ignored,
}

/// One worker version with its handlers.
pub struct OfflineWorker {
    id: ServiceWorkerId,
    config: WorkerConfig,
    origin: Url,
    caches: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    notifications: Arc<dyn NotificationSink>,
    clients: Arc<RwLock<Clients>>,
}

impl OfflineWorker {
    pub fn new(
        config: WorkerConfig,
        origin: Url,
        caches: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
        notifications: Arc<dyn NotificationSink>,
        clients: Arc<RwLock<Clients>>,
    ) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            config,
            origin,
            caches,
            fetcher,
            notifications,
            clients,
        }
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        self.origin
            .join(path)
            .map_err(|e| ServiceWorkerError::NotFound(format!("{path}: {e}")))
    }

    /// Open the bucket and store every shell resource, or fail as a whole.
    pub async fn install(&self) -> Result<(), ServiceWorkerError> {
        let cache = self.cache_name();
        self.caches.open(cache).await;
        info!(cache, "Opened cache");

        let requests = self
            .config
            .precache
            .iter()
            .map(|path| self.resolve(path).map(Request::get))
            .collect::<Result<Vec<_>, _>>()?;

        self.caches
            .add_all(cache, &requests, self.fetcher.as_ref())
            .await
            .map_err(|e| ServiceWorkerError::InstallFailed(e.to_string()))
    }

    /// Delete every other bucket and claim the pages in scope.
    pub async fn activate(&self) -> Result<ActivateOutcome, ServiceWorkerError> {
        let mut outcome = ActivateOutcome::default();

        for name in self.caches.keys().await {
            if name != self.config.cache_name && self.caches.delete(&name).await {
                info!(cache = %name, "Deleted outdated cache");
                outcome.deleted_caches.push(name);
            }
        }

        outcome.claimed = self.clients.write().await.claim(self.id, &self.origin);
        debug!(claimed = outcome.claimed.len(), "Clients claimed");
        Ok(outcome)
    }

    /// Cache first, then network, then offline fallback. Never fails.
    pub async fn handle_fetch(&self, request: &Request) -> Response {
        let cache = self.cache_name();

        if let Some(hit) = self.caches.match_in(cache, request).await {
            debug!(url = %request.url, "Cache hit");
            return hit;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status != 200 || response.response_type != ResponseType::Basic {
                    return response;
                }
                match self.caches.put(cache, request, response.clone()).await {
                    Ok(()) => {}
                    Err(ServiceWorkerError::NotFound(_)) => {
                        debug!(url = %request.url, cache, "Cache was replaced, response not stored")
                    }
                    Err(e) => warn!(url = %request.url, error = %e, "Failed to cache response"),
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network fetch failed");
                self.offline_response(request).await
            }
        }
    }

    async fn offline_response(&self, request: &Request) -> Response {
        if request.is_navigation() {
            match self.resolve(&self.config.offline_fallback) {
                Ok(fallback) => {
                    if let Some(page) = self.caches.match_url_in(self.cache_name(), &fallback).await {
                        info!(url = %request.url, "Serving offline fallback");
                        return page;
                    }
                    warn!(url = %fallback, "Offline fallback is not cached");
                }
                Err(e) => warn!(error = %e, "Invalid offline fallback path"),
            }
        }
        Response::synthetic(
            request.url.clone(),
            408,
            "text/plain",
            Bytes::from_static(b"Network error happened"),
        )
    }

    /// Render a push payload and show it. Display errors are logged, not returned.
    pub async fn handle_push(&self, payload: Option<&[u8]>) -> Option<Notification> {
        let message = PushMessage::parse(payload, &self.config.notifications);
        match self.notifications.show(&message.title, message.options).await {
            Ok(notification) => Some(notification),
            Err(e) => {
                error!(error = %e, "Error handling push event");
                None
            }
        }
    }

    /// Close the notification, then focus or open the window for its route.
    pub async fn handle_notification_click(
        &self,
        notification: &Notification,
    ) -> Result<ClickOutcome, ServiceWorkerError> {
        self.notifications.close(notification.id).await;

        let target = self.resolve(route_for(&notification.options.data))?;
        let mut clients = self.clients.write().await;

        // Only windows this origin's workers control are candidates.
        let options = ClientMatchOptions {
            include_uncontrolled: false,
            client_type: ClientType::Window,
        };
        let existing = clients
            .match_all(&options)
            .into_iter()
            .find(|c| c.url == target)
            .map(|c| c.id.clone());

        match existing {
            Some(id) => {
                debug!(url = %target, "Focusing existing window");
                clients.focus(&id).map(ClickOutcome::Focused)
            }
            None => {
                debug!(url = %target, "Opening new window");
                Ok(ClickOutcome::Opened(clients.open_window(target, Some(self.id))))
            }
        }
    }

    /// Acknowledge the content sync tag; nothing is synchronized.
    pub async fn handle_periodic_sync(&self, tag: &str) -> SyncOutcome {
        if tag == self.config.periodic_sync_tag {
            info!(tag, "Performing periodic sync");
            SyncOutcome::Acknowledged
        } else {
            debug!(tag, "Ignoring periodic sync");
            SyncOutcome::Ignored
        }
    }
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("cache_name", &self.config.cache_name)
            .field("origin", &self.origin.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationShelf;
    use async_trait::async_trait;
    use http::HeaderMap;
    use pwa_net::NetError;

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _request: &Request) -> Result<Response, NetError> {
            Err(NetError::Offline)
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
            Ok(Response::basic(request.url.clone(), 200, HeaderMap::new(), "echo"))
        }
    }

    fn worker(shelf: Arc<NotificationShelf>) -> OfflineWorker {
        OfflineWorker::new(
            WorkerConfig::default(),
            Url::parse("https://app.example.com/").unwrap(),
            CacheStorage::new(),
            Arc::new(FailingFetcher),
            shelf,
            Arc::new(RwLock::new(Clients::new())),
        )
    }

    #[tokio::test]
    async fn test_install_failure_is_reported() {
        let worker = worker(Arc::new(NotificationShelf::new()));
        assert!(matches!(
            worker.install().await,
            Err(ServiceWorkerError::InstallFailed(_))
        ));
        assert_eq!(worker.caches.entry_count("pwa-cache-v1").await, Some(0));
    }

    #[tokio::test]
    async fn test_subresource_failure_synthesizes_408() {
        let worker = worker(Arc::new(NotificationShelf::new()));
        let request = Request::get(Url::parse("https://app.example.com/api/items").unwrap());

        let response = worker.handle_fetch(&request).await;
        assert_eq!(response.status, 408);
        assert_eq!(response.text().unwrap(), "Network error happened");
        assert_eq!(response.headers["content-type"], "text/plain");
    }

    #[tokio::test]
    async fn test_navigation_without_fallback_synthesizes_408() {
        let worker = worker(Arc::new(NotificationShelf::new()));
        let request = Request::navigate(Url::parse("https://app.example.com/about").unwrap());
        assert_eq!(worker.handle_fetch(&request).await.status, 408);
    }

    #[tokio::test]
    async fn test_navigation_falls_back_to_cached_document() {
        let worker = worker(Arc::new(NotificationShelf::new()));
        let index = Url::parse("https://app.example.com/index.html").unwrap();
        worker.caches.open("pwa-cache-v1").await;
        worker
            .caches
            .put(
                "pwa-cache-v1",
                &Request::get(index.clone()),
                Response::basic(index, 200, HeaderMap::new(), "<html>shell</html>"),
            )
            .await
            .unwrap();

        let request = Request::navigate(Url::parse("https://app.example.com/settings").unwrap());
        let response = worker.handle_fetch(&request).await;
        assert_eq!(response.status, 200);
        assert!(response.from_cache);
        assert_eq!(response.text().unwrap(), "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_push_shows_notification() {
        let shelf = Arc::new(NotificationShelf::new());
        let worker = worker(shelf.clone());

        let shown = worker.handle_push(Some(b"{}".as_slice())).await.unwrap();
        assert_eq!(shown.title, "New Notification");
        assert_eq!(shelf.displayed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_click_opens_then_focuses() {
        let shelf = Arc::new(NotificationShelf::new());
        let worker = worker(shelf.clone());
        let notification = worker
            .handle_push(Some(br#"{"data": {"type": "warning"}}"#.as_slice()))
            .await
            .unwrap();

        let first = worker.handle_notification_click(&notification).await.unwrap();
        assert!(matches!(first, ClickOutcome::Opened(_)));
        assert_eq!(
            first.client().url.as_str(),
            "https://app.example.com/?section=warning"
        );
        assert!(shelf.displayed().await.is_empty());

        let second = worker.handle_notification_click(&notification).await.unwrap();
        assert!(matches!(second, ClickOutcome::Focused(_)));
        assert_eq!(second.client().id, first.client().id);
        assert_eq!(worker.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_click_ignores_uncontrolled_window() {
        let shelf = Arc::new(NotificationShelf::new());
        let worker = worker(shelf.clone());
        let page = Client::window(Url::parse("https://app.example.com/?section=info").unwrap());
        let page_id = page.id.clone();
        worker.clients.write().await.add(page);

        let notification = worker
            .handle_push(Some(br#"{"data": {"type": "info"}}"#.as_slice()))
            .await
            .unwrap();
        let outcome = worker.handle_notification_click(&notification).await.unwrap();

        let ClickOutcome::Opened(opened) = outcome else {
            panic!("expected a new window, got {outcome:?}");
        };
        assert_ne!(opened.id, page_id);
        assert_eq!(opened.controller, Some(worker.id()));
        assert!(!worker.clients.read().await.get(&page_id).unwrap().focused);
    }

    #[tokio::test]
    async fn test_fetch_after_cache_deleted_leaves_it_deleted() {
        let worker = OfflineWorker::new(
            WorkerConfig::default(),
            Url::parse("https://app.example.com/").unwrap(),
            CacheStorage::new(),
            Arc::new(EchoFetcher),
            Arc::new(NotificationShelf::new()),
            Arc::new(RwLock::new(Clients::new())),
        );
        let request = Request::get(Url::parse("https://app.example.com/app.js").unwrap());

        let response = worker.handle_fetch(&request).await;

        assert_eq!(response.status, 200);
        assert!(!worker.caches.has("pwa-cache-v1").await);
    }

    #[tokio::test]
    async fn test_periodic_sync_tags() {
        let worker = worker(Arc::new(NotificationShelf::new()));
        assert_eq!(
            worker.handle_periodic_sync("content-sync").await,
            SyncOutcome::Acknowledged
        );
        assert_eq!(worker.handle_periodic_sync("news").await, SyncOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_activate_claims_in_scope_clients() {
        let worker = worker(Arc::new(NotificationShelf::new()));
        worker
            .clients
            .write()
            .await
            .add(Client::window(Url::parse("https://app.example.com/").unwrap()));
        worker.caches.open("pwa-cache-v0").await;

        let outcome = worker.activate().await.unwrap();
        assert_eq!(outcome.deleted_caches, vec!["pwa-cache-v0".to_string()]);
        assert_eq!(outcome.claimed.len(), 1);
    }
}
