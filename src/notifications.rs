use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// An inbound push message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub from: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, String>,
    pub notification: Option<Notification>,
}

/// Endpoint for push messages. Log-only: it never touches the feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationReceiver;

impl NotificationReceiver {
    pub fn on_message_received(&self, message: &RemoteMessage) {
        log::debug!(
            "push message from: {}",
            message.from.as_deref().unwrap_or("<unknown>")
        );
        if !message.data.is_empty() {
            log::debug!("push payload: {:?}", message.data);
        }
        if let Some(notification) = &message.notification {
            log::debug!(
                "push notification: {}",
                notification.body.as_deref().unwrap_or_default()
            );
        }
    }

    /// Handles messages until every sender is dropped; returns how many were seen.
    pub async fn run(self, mut rx: mpsc::Receiver<RemoteMessage>) -> usize {
        let mut handled = 0;
        while let Some(message) = rx.recv().await {
            self.on_message_received(&message);
            handled += 1;
        }
        handled
    }
}
