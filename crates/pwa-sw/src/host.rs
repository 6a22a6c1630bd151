//! Event host: each platform event becomes a task with an awaited reply.
//!
//! Install and activate run inline so lifecycle steps never overlap. Fetch,
//! push, click and sync events are spawned onto a `JoinSet` and may complete
//! in any order. Shutdown stops intake and drains every pending task.

use std::sync::Arc;

use bytes::Bytes;
use pwa_net::{Request, Response};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::lifecycle::ServiceWorkerId;
use crate::notification::Notification;
use crate::worker::{ActivateOutcome, ClickOutcome, OfflineWorker, SyncOutcome};
use crate::ServiceWorkerError;

/// Events delivered to a worker.
#[derive(Debug)]
enum WorkerEvent {
    Install(oneshot::Sender<Result<(), ServiceWorkerError>>),
    Activate(oneshot::Sender<Result<ActivateOutcome, ServiceWorkerError>>),
    Fetch {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    Push {
        payload: Option<Bytes>,
        reply: oneshot::Sender<Option<Notification>>,
    },
    NotificationClick {
        notification: Notification,
        reply: oneshot::Sender<Result<ClickOutcome, ServiceWorkerError>>,
    },
    PeriodicSync {
        tag: String,
        reply: oneshot::Sender<SyncOutcome>,
    },
    Shutdown(oneshot::Sender<()>),
}

impl WorkerEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::Activate(_) => "activate",
            Self::Fetch { .. } => "fetch",
            Self::Push { .. } => "push",
            Self::NotificationClick { .. } => "notificationclick",
            Self::PeriodicSync { .. } => "periodicsync",
            Self::Shutdown(_) => "shutdown",
        }
    }
}

/// Runs one worker's event loop.
pub struct WorkerHost {
    worker: Arc<OfflineWorker>,
    inbox: mpsc::UnboundedReceiver<WorkerEvent>,
    tasks: JoinSet<()>,
}

impl WorkerHost {
    /// Spawn the event loop on the current runtime.
    pub fn spawn(worker: OfflineWorker) -> WorkerHandle {
        let (tx, inbox) = mpsc::unbounded_channel();
        let id = worker.id();
        let host = Self {
            worker: Arc::new(worker),
            inbox,
            tasks: JoinSet::new(),
        };
        tokio::spawn(host.run());
        WorkerHandle { id, tx }
    }

    async fn run(mut self) {
        debug!(worker = self.worker.id().raw(), "Worker host started");
        loop {
            tokio::select! {
                event = self.inbox.recv() => match event {
                    Some(WorkerEvent::Shutdown(done)) => {
                        self.inbox.close();
                        self.drain().await;
                        let _ = done.send(());
                        return;
                    }
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Worker task failed");
                    }
                }
            }
        }
        self.drain().await;
    }

    async fn dispatch(&mut self, event: WorkerEvent) {
        debug!(event = event.name(), "Dispatching worker event");
        let worker = Arc::clone(&self.worker);
        match event {
            WorkerEvent::Install(reply) => {
                let _ = reply.send(worker.install().await);
            }
            WorkerEvent::Activate(reply) => {
                let _ = reply.send(worker.activate().await);
            }
            WorkerEvent::Fetch { request, reply } => {
                self.tasks.spawn(async move {
                    let _ = reply.send(worker.handle_fetch(&request).await);
                });
            }
            WorkerEvent::Push { payload, reply } => {
                self.tasks.spawn(async move {
                    let _ = reply.send(worker.handle_push(payload.as_deref()).await);
                });
            }
            WorkerEvent::NotificationClick {
                notification,
                reply,
            } => {
                self.tasks.spawn(async move {
                    let _ = reply.send(worker.handle_notification_click(&notification).await);
                });
            }
            WorkerEvent::PeriodicSync { tag, reply } => {
                self.tasks.spawn(async move {
                    let _ = reply.send(worker.handle_periodic_sync(&tag).await);
                });
            }
            WorkerEvent::Shutdown(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn drain(&mut self) {
        // Events queued before the inbox closed still get handled.
        while let Ok(event) = self.inbox.try_recv() {
            self.dispatch(event).await;
        }
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }
        info!(worker = self.worker.id().raw(), "Worker host stopped");
    }
}

/// Cloneable front end to a running worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: ServiceWorkerId,
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent,
    ) -> Result<T, ServiceWorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(event(reply))
            .map_err(|_| ServiceWorkerError::HostClosed)?;
        rx.await.map_err(|_| ServiceWorkerError::HostClosed)
    }

    pub async fn install(&self) -> Result<(), ServiceWorkerError> {
        self.call(WorkerEvent::Install).await?
    }

    pub async fn activate(&self) -> Result<ActivateOutcome, ServiceWorkerError> {
        self.call(WorkerEvent::Activate).await?
    }

    /// Intercept a fetch. Resolves once the worker has produced a response.
    pub async fn fetch(&self, request: Request) -> Result<Response, ServiceWorkerError> {
        self.call(|reply| WorkerEvent::Fetch { request, reply }).await
    }

    pub async fn push(
        &self,
        payload: Option<Bytes>,
    ) -> Result<Option<Notification>, ServiceWorkerError> {
        self.call(|reply| WorkerEvent::Push { payload, reply }).await
    }

    pub async fn notification_click(
        &self,
        notification: Notification,
    ) -> Result<ClickOutcome, ServiceWorkerError> {
        self.call(|reply| WorkerEvent::NotificationClick {
            notification,
            reply,
        })
        .await?
    }

    pub async fn periodic_sync(&self, tag: impl Into<String>) -> Result<SyncOutcome, ServiceWorkerError> {
        let tag = tag.into();
        self.call(|reply| WorkerEvent::PeriodicSync { tag, reply })
            .await
    }

    /// Stop accepting events and wait for pending ones to finish.
    pub async fn shutdown(&self) -> Result<(), ServiceWorkerError> {
        self.call(WorkerEvent::Shutdown).await
    }
}
