//! Notification descriptors, push payload parsing and the display sink.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use pwa_common::NotificationDefaults;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ServiceWorkerError;

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Options passed along with a notification title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: Option<String>,
    /// Notifications sharing a tag replace each other.
    pub tag: Option<String>,
    pub data: Value,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u64>,
}

/// A notification as shown by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: NotificationOptions,
}

impl Notification {
    pub fn new(title: impl Into<String>, options: NotificationOptions) -> Self {
        Self {
            id: NotificationId::next(),
            title: title.into(),
            options,
        }
    }
}

/// Where notifications end up being displayed.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<Notification, ServiceWorkerError>;

    /// Close a notification. Returns false if it was not open.
    async fn close(&self, id: NotificationId) -> bool;
}

/// In-memory sink that keeps every open notification.
#[derive(Debug, Default)]
pub struct NotificationShelf {
    open: Mutex<Vec<Notification>>,
}

impl NotificationShelf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently open notifications, oldest first.
    pub async fn displayed(&self) -> Vec<Notification> {
        self.open.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for NotificationShelf {
    async fn show(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<Notification, ServiceWorkerError> {
        let notification = Notification::new(title, options);
        let mut open = self.open.lock().await;
        if let Some(tag) = notification.options.tag.as_deref() {
            open.retain(|n| n.options.tag.as_deref() != Some(tag));
        }
        debug!(title, tag = ?notification.options.tag, "Showing notification");
        open.push(notification.clone());
        Ok(notification)
    }

    async fn close(&self, id: NotificationId) -> bool {
        let mut open = self.open.lock().await;
        let before = open.len();
        open.retain(|n| n.id != id);
        open.len() != before
    }
}

/// A push message rendered into a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub options: NotificationOptions,
}

impl PushMessage {
    /// Parse a push payload, defaulting every missing or empty field.
    ///
    /// Absent, malformed or non-object payloads are treated as `{}`.
    pub fn parse(payload: Option<&[u8]>, defaults: &NotificationDefaults) -> Self {
        let fields = match payload.map(serde_json::from_slice::<Value>) {
            None => Map::new(),
            Some(Ok(Value::Object(map))) => map,
            Some(Ok(other)) => {
                warn!(kind = json_kind(&other), "Push payload is not an object, using defaults");
                Map::new()
            }
            Some(Err(e)) => {
                warn!(error = %e, "Malformed push payload, using defaults");
                Map::new()
            }
        };

        // Any truthy value is kept and shown as text.
        let text = |key: &str, default: &str| -> String {
            match fields.get(key) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(value) if is_truthy(value) => value.to_string(),
                _ => default.to_string(),
            }
        };

        let data = match fields.get("data") {
            Some(value) if is_truthy(value) => value.clone(),
            _ => Value::Object(Map::new()),
        };

        let vibrate = match fields.get("vibrate") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_u64).collect(),
            Some(Value::Number(n)) if n.as_u64().unwrap_or(0) > 0 => {
                n.as_u64().into_iter().collect()
            }
            _ => defaults.vibrate.clone(),
        };

        Self {
            title: text("title", &defaults.title),
            options: NotificationOptions {
                body: text("body", &defaults.body),
                icon: text("icon", &defaults.icon),
                badge: Some(text("badge", &defaults.badge)),
                tag: Some(text("tag", &defaults.tag)),
                data,
                vibrate,
            },
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// In-app route opened when a notification with this data is clicked.
pub fn route_for(data: &Value) -> &'static str {
    match data.get("type").and_then(Value::as_str) {
        Some("info") => "/?section=info",
        Some("success") => "/?section=success",
        Some("warning") => "/?section=warning",
        Some("error") => "/?section=error",
        _ => "/",
    }
}
