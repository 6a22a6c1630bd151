//! Wires the loader, the worker container and the notification trigger together.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use pwa_common::PwaConfig;
use pwa_net::{Fetcher, LoaderConfig, NetworkStatus, Request, ResourceLoader, Response};
use pwa_notify::{FixedPrompt, NotificationKind, NotificationTrigger, Permission};
use pwa_sw::{
    ClickOutcome, ContainerEvent, Notification, ServiceWorkerContainer, ServiceWorkerState,
};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::console::ConsoleSink;

/// What `status` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub network: &'static str,
    pub controller: Option<ServiceWorkerState>,
    pub caches: Vec<(String, usize)>,
}

/// Result of pressing one notification button.
#[derive(Debug)]
pub struct NotifyReport {
    pub shown: Option<Notification>,
    pub status: String,
}

/// One page session against the configured origin.
pub struct Demo {
    config: PwaConfig,
    status: NetworkStatus,
    container: Arc<ServiceWorkerContainer>,
    worker_sink: Arc<ConsoleSink>,
    page_sink: Arc<ConsoleSink>,
}

impl Demo {
    /// Build a session that talks to the real network.
    pub fn new(config: PwaConfig) -> Result<Self> {
        let status = NetworkStatus::default();
        let loader = ResourceLoader::new(loader_config(&config), status.clone())
            .context("failed to build HTTP client")?;
        Ok(Self::with_fetcher(config, Arc::new(loader), status))
    }

    /// Build a session around any fetcher. Must be called inside a runtime.
    pub fn with_fetcher(config: PwaConfig, fetcher: Arc<dyn Fetcher>, status: NetworkStatus) -> Self {
        let worker_sink = Arc::new(ConsoleSink::new("worker"));
        let page_sink = Arc::new(ConsoleSink::new("page"));
        let (container, events) =
            ServiceWorkerContainer::new(config.origin.clone(), fetcher, worker_sink.clone());
        tokio::spawn(log_events(events));

        Self {
            config,
            status,
            container: Arc::new(container),
            worker_sink,
            page_sink,
        }
    }

    pub fn container(&self) -> &Arc<ServiceWorkerContainer> {
        &self.container
    }

    pub fn worker_sink(&self) -> &Arc<ConsoleSink> {
        &self.worker_sink
    }

    pub fn page_sink(&self) -> &Arc<ConsoleSink> {
        &self.page_sink
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.config
            .origin
            .join(path)
            .with_context(|| format!("invalid path '{path}'"))
    }

    /// Open the root page and register the worker, as loading the app does.
    pub async fn install(&self) -> Result<()> {
        self.container.open_page(self.config.origin.clone()).await;
        self.container
            .register(self.config.worker.clone())
            .await
            .with_context(|| format!("failed to install worker {}", self.config.worker.cache_name))?;
        Ok(())
    }

    /// Install, optionally go offline, then fetch every path.
    ///
    /// A failed install leaves the page uncontrolled and requests go straight to
    /// the network. A request that fails outright is reported as a network error
    /// response.
    pub async fn fetch(&self, paths: &[String], offline: bool, navigate: bool) -> Result<Vec<Response>> {
        if let Err(e) = self.install().await {
            warn!(error = %e, "Continuing without a service worker");
        }
        if offline {
            self.status.set_online(false);
        }

        let mut responses = Vec::with_capacity(paths.len());
        for path in paths {
            let url = self.resolve(path)?;
            let request = if navigate {
                Request::navigate(url.clone())
            } else {
                Request::get(url.clone())
            };
            let response = match self.container.fetch(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(path = %path, error = %e, "Fetch failed");
                    Response::network_error(url)
                }
            };
            debug!(path = %path, status = response.status, from_cache = response.from_cache, "Fetched");
            responses.push(response);
        }
        Ok(responses)
    }

    /// Deliver a push message to the active worker.
    pub async fn push(&self, payload: Option<String>) -> Result<Option<Notification>> {
        self.install().await?;
        let worker = self
            .container
            .ready()
            .await
            .context("no active worker to receive the push")?;
        Ok(worker.push(payload.map(Bytes::from)).await?)
    }

    /// Show a notification for `kind` through the worker and click it.
    pub async fn click(&self, kind: Option<&str>) -> Result<ClickOutcome> {
        self.install().await?;
        let worker = self
            .container
            .ready()
            .await
            .context("no active worker to handle the click")?;

        let data = kind.map_or(serde_json::Value::Null, |kind| json!({ "type": kind }));
        let payload = json!({ "title": "Click me", "data": data }).to_string();
        let notification = worker
            .push(Some(Bytes::from(payload)))
            .await?
            .context("worker did not display the notification")?;

        Ok(worker.notification_click(notification).await?)
    }

    /// Press one of the notification buttons.
    pub async fn notify(&self, kind: NotificationKind, deny: bool, page_only: bool) -> NotifyReport {
        let answer = if deny {
            Permission::Denied
        } else {
            Permission::Granted
        };
        let mut trigger =
            NotificationTrigger::new(Arc::new(FixedPrompt::new(answer)), self.page_sink.clone());

        if !page_only {
            match self.install().await {
                Ok(()) => trigger = trigger.with_worker(Arc::clone(&self.container)),
                Err(e) => warn!(error = %e, "Worker unavailable, notifying from the page"),
            }
        }

        let shown = trigger.send_notification(kind).await;
        NotifyReport {
            shown,
            status: trigger.status().await,
        }
    }

    /// Network indicator, controller state and cache contents.
    pub async fn status(&self, offline: bool) -> StatusReport {
        if offline {
            self.status.set_online(false);
        }

        let caches = self.container.caches();
        let mut buckets = Vec::new();
        for name in caches.keys().await {
            let count = caches.entry_count(&name).await.unwrap_or_default();
            buckets.push((name, count));
        }

        StatusReport {
            network: self.status.label(),
            controller: self.container.controller_state().await,
            caches: buckets,
        }
    }
}

fn loader_config(config: &PwaConfig) -> LoaderConfig {
    LoaderConfig {
        user_agent: config.loader.user_agent.clone(),
        timeout: std::time::Duration::from_secs(config.loader.timeout_secs),
        max_redirects: config.loader.max_redirects,
        ..LoaderConfig::new(config.origin.clone())
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<ContainerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ContainerEvent::UpdateFound { version } => info!(version = %version, "Update found"),
            ContainerEvent::StateChange { worker_id, new_state } => {
                debug!(worker = worker_id.raw(), state = %new_state, "Worker state")
            }
            ContainerEvent::ControllerChange { client_id } => {
                info!(client = %client_id.as_str(), "Controller changed")
            }
        }
    }
}
