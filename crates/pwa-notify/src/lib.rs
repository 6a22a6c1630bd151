//! Page-side notification buttons.
//!
//! [`NotificationTrigger`] asks for permission, builds one of the preset
//! notifications and displays it. When a service worker container is attached
//! and has an active worker, the notification goes through the worker
//! registration with a badge, tag and click data. Otherwise the page shows a
//! plain notification itself.

pub mod presets;

use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use async_trait::async_trait;
use pwa_sw::{Notification, NotificationOptions, NotificationSink, ServiceWorkerContainer, ServiceWorkerError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

pub use presets::{preset_for, NotificationKind, NotificationPreset};

const BADGE: &str = "/icon-192x192.png";

/// Errors from the notification trigger.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Permission request failed: {0}")]
    PermissionFailed(String),

    #[error("Unknown notification kind: {0}")]
    UnknownKind(String),

    #[error("Display failed: {0}")]
    Display(#[from] ServiceWorkerError),
}

/// Notification permission as the platform reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

impl Permission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// The platform permission dialog.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Permission currently in effect.
    fn current(&self) -> Permission;

    /// Ask the user.
    async fn request(&self) -> Result<Permission, NotifyError>;
}

/// Prompt that always gives the same answer, or always fails.
#[derive(Debug)]
pub struct FixedPrompt {
    answer: Option<Permission>,
    current: StdRwLock<Permission>,
}

impl FixedPrompt {
    pub fn new(answer: Permission) -> Self {
        Self {
            answer: Some(answer),
            current: StdRwLock::new(Permission::Default),
        }
    }

    /// A prompt whose request always errors.
    pub fn failing() -> Self {
        Self {
            answer: None,
            current: StdRwLock::new(Permission::Default),
        }
    }
}

#[async_trait]
impl PermissionPrompt for FixedPrompt {
    fn current(&self) -> Permission {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request(&self) -> Result<Permission, NotifyError> {
        let answer = self
            .answer
            .ok_or_else(|| NotifyError::PermissionFailed("prompt unavailable".to_string()))?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = answer;
        Ok(answer)
    }
}

/// Drives the permission button and the four notification buttons.
pub struct NotificationTrigger {
    prompt: Arc<dyn PermissionPrompt>,
    permission: RwLock<Permission>,
    status: RwLock<String>,
    worker: Option<Arc<ServiceWorkerContainer>>,
    page: Arc<dyn NotificationSink>,
}

impl NotificationTrigger {
    /// Trigger that shows notifications on the page only.
    pub fn new(prompt: Arc<dyn PermissionPrompt>, page: Arc<dyn NotificationSink>) -> Self {
        let permission = prompt.current();
        Self {
            prompt,
            permission: RwLock::new(permission),
            status: RwLock::new(String::new()),
            worker: None,
            page,
        }
    }

    /// Route notifications through the container's active worker when there is one.
    pub fn with_worker(mut self, container: Arc<ServiceWorkerContainer>) -> Self {
        self.worker = Some(container);
        self
    }

    pub async fn permission(&self) -> Permission {
        *self.permission.read().await
    }

    /// Last status message shown next to the buttons.
    pub async fn status(&self) -> String {
        self.status.read().await.clone()
    }

    async fn set_status(&self, message: impl Into<String>) {
        let message = message.into();
        info!(status = %message, "Notification status");
        *self.status.write().await = message;
    }

    /// Ask for permission and record the answer.
    pub async fn request_permission(&self) -> Permission {
        match self.prompt.request().await {
            Ok(permission) => {
                *self.permission.write().await = permission;
                let message = match permission {
                    Permission::Granted => "Notification permission granted!",
                    Permission::Denied => "Notification permission denied.",
                    Permission::Default => "Notification permission dismissed.",
                };
                self.set_status(message).await;
                permission
            }
            Err(e) => {
                error!(error = %e, "Error requesting notification permission");
                self.set_status("Error requesting notification permission.")
                    .await;
                self.permission().await
            }
        }
    }

    /// Show the preset for `kind`. Returns the notification if one was displayed.
    pub async fn send_notification(&self, kind: NotificationKind) -> Option<Notification> {
        if !self.permission().await.is_granted() {
            self.request_permission().await;
            if !self.prompt.current().is_granted() {
                debug!(kind = %kind, "Notification skipped without permission");
                return None;
            }
        }

        match self.display(kind).await {
            Ok(notification) => {
                self.set_status(format!("{} notification sent!", kind.label()))
                    .await;
                Some(notification)
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Error sending notification");
                self.set_status(format!("Error sending {kind} notification."))
                    .await;
                None
            }
        }
    }

    async fn display(&self, kind: NotificationKind) -> Result<Notification, NotifyError> {
        let preset = preset_for(kind.as_str());

        if let Some(container) = &self.worker {
            if container.ready().await.is_some() {
                let options = NotificationOptions {
                    body: preset.body.to_string(),
                    icon: preset.icon.to_string(),
                    badge: Some(preset.badge.unwrap_or(BADGE).to_string()),
                    tag: preset.tag.map(str::to_string),
                    data: json!({ "type": kind.as_str() }),
                    ..Default::default()
                };
                return Ok(container.show_notification(preset.title, options).await?);
            }
        }

        let options = NotificationOptions {
            body: preset.body.to_string(),
            icon: preset.icon.to_string(),
            ..Default::default()
        };
        Ok(self.page.show(preset.title, options).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwa_sw::{NotificationId, NotificationShelf};

    struct BrokenSink;

    #[async_trait]
    impl NotificationSink for BrokenSink {
        async fn show(
            &self,
            _title: &str,
            _options: NotificationOptions,
        ) -> Result<Notification, ServiceWorkerError> {
            Err(ServiceWorkerError::NotificationError("display refused".to_string()))
        }

        async fn close(&self, _id: NotificationId) -> bool {
            false
        }
    }

    fn trigger(prompt: FixedPrompt, page: Arc<dyn NotificationSink>) -> NotificationTrigger {
        NotificationTrigger::new(Arc::new(prompt), page)
    }

    #[tokio::test]
    async fn test_request_permission_statuses() {
        let shelf = Arc::new(NotificationShelf::new());

        let granted = trigger(FixedPrompt::new(Permission::Granted), shelf.clone());
        assert_eq!(granted.request_permission().await, Permission::Granted);
        assert_eq!(granted.status().await, "Notification permission granted!");

        let denied = trigger(FixedPrompt::new(Permission::Denied), shelf.clone());
        denied.request_permission().await;
        assert_eq!(denied.status().await, "Notification permission denied.");

        let dismissed = trigger(FixedPrompt::new(Permission::Default), shelf.clone());
        dismissed.request_permission().await;
        assert_eq!(dismissed.status().await, "Notification permission dismissed.");

        let broken = trigger(FixedPrompt::failing(), shelf);
        assert_eq!(broken.request_permission().await, Permission::Default);
        assert_eq!(
            broken.status().await,
            "Error requesting notification permission."
        );
    }

    #[tokio::test]
    async fn test_send_requests_permission_inline() {
        let shelf = Arc::new(NotificationShelf::new());
        let trigger = trigger(FixedPrompt::new(Permission::Granted), shelf.clone());
        assert_eq!(trigger.permission().await, Permission::Default);

        let shown = trigger.send_notification(NotificationKind::Info).await.unwrap();

        assert_eq!(trigger.permission().await, Permission::Granted);
        assert_eq!(shown.title, "Information");
        assert_eq!(trigger.status().await, "Info notification sent!");
        assert_eq!(shelf.displayed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_denied_permission_sends_nothing() {
        let shelf = Arc::new(NotificationShelf::new());
        let trigger = trigger(FixedPrompt::new(Permission::Denied), shelf.clone());

        assert!(trigger.send_notification(NotificationKind::Warning).await.is_none());
        assert!(shelf.displayed().await.is_empty());
        assert_eq!(trigger.status().await, "Notification permission denied.");
    }

    #[tokio::test]
    async fn test_page_route_sends_plain_notification() {
        let shelf = Arc::new(NotificationShelf::new());
        let trigger = trigger(FixedPrompt::new(Permission::Granted), shelf);

        let shown = trigger.send_notification(NotificationKind::Success).await.unwrap();
        assert_eq!(shown.title, "Success!");
        assert_eq!(shown.options.body, "Your action was completed successfully.");
        assert_eq!(shown.options.icon, "/icon-192x192.png");
        assert_eq!(shown.options.tag, None);
        assert_eq!(shown.options.badge, None);
        assert!(shown.options.data.is_null());
    }

    #[tokio::test]
    async fn test_display_error_sets_status() {
        let trigger = trigger(FixedPrompt::new(Permission::Granted), Arc::new(BrokenSink));

        assert!(trigger.send_notification(NotificationKind::Error).await.is_none());
        assert_eq!(trigger.status().await, "Error sending error notification.");
    }
}
