//! Terminal stand-in for the system notification tray.

use std::sync::Arc;

use async_trait::async_trait;
use pwa_sw::{
    Notification, NotificationId, NotificationOptions, NotificationShelf, NotificationSink,
    ServiceWorkerError,
};
use tracing::info;

/// Keeps notifications on a shelf and prints each one as it appears.
pub struct ConsoleSink {
    label: &'static str,
    shelf: Arc<NotificationShelf>,
}

impl ConsoleSink {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            shelf: Arc::new(NotificationShelf::new()),
        }
    }

    pub fn shelf(&self) -> &Arc<NotificationShelf> {
        &self.shelf
    }
}

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn show(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<Notification, ServiceWorkerError> {
        let notification = self.shelf.show(title, options).await?;
        info!(source = self.label, title, tag = ?notification.options.tag, "Notification shown");
        println!("{}", render(self.label, &notification));
        Ok(notification)
    }

    async fn close(&self, id: NotificationId) -> bool {
        self.shelf.close(id).await
    }
}

/// One block of text per notification.
pub fn render(label: &str, notification: &Notification) -> String {
    let options = &notification.options;
    let mut out = format!("[{label}] {}\n  {}", notification.title, options.body);
    if !options.icon.is_empty() {
        out.push_str(&format!("\n  icon:  {}", options.icon));
    }
    if let Some(badge) = &options.badge {
        out.push_str(&format!("\n  badge: {badge}"));
    }
    if let Some(tag) = &options.tag {
        out.push_str(&format!("\n  tag:   {tag}"));
    }
    if !options.data.is_null() {
        out.push_str(&format!("\n  data:  {}", options.data));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_console_sink_keeps_shelf() {
        let sink = ConsoleSink::new("worker");
        let shown = sink
            .show(
                "Hello",
                NotificationOptions {
                    body: "World".to_string(),
                    tag: Some("greeting".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(sink.shelf().displayed().await, vec![shown.clone()]);
        assert!(sink.close(shown.id).await);
        assert!(sink.shelf().displayed().await.is_empty());
    }

    #[test]
    fn test_render_skips_empty_fields() {
        let plain = Notification::new(
            "Info",
            NotificationOptions {
                body: "Body".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(render("page", &plain), "[page] Info\n  Body");

        let rich = Notification::new(
            "Info",
            NotificationOptions {
                body: "Body".to_string(),
                icon: "/icon-192x192.png".to_string(),
                tag: Some("info-notification".to_string()),
                data: json!({"type": "info"}),
                ..Default::default()
            },
        );
        let text = render("worker", &rich);
        assert!(text.contains("tag:   info-notification"));
        assert!(text.contains(r#"data:  {"type":"info"}"#));
    }
}
