//! Push notification channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::NotificationChannel;
use crate::Result;
use crate::notification::models::{ChannelKind, Notification, NotificationPriority};

/// Payload handed to the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub notification_id: String,
    pub user_id: String,
    pub category: String,
    pub priority: NotificationPriority,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&Notification> for PushMessage {
    fn from(notification: &Notification) -> Self {
        Self {
            notification_id: notification.id.clone(),
            user_id: notification.user_id.clone(),
            category: notification.category.clone(),
            priority: notification.priority,
            title: notification.title.clone(),
            body: notification.message.clone(),
            data: notification.data.clone(),
        }
    }
}

/// Push-gateway collaborator. Fails when the device is unreachable, the
/// subscription expired, and so on.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send_push(&self, message: &PushMessage) -> Result<()>;
}

/// Push notification channel.
pub struct PushChannel {
    transport: Arc<dyn PushTransport>,
}

impl PushChannel {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl NotificationChannel for PushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.transport
            .send_push(&PushMessage::from(notification))
            .await
    }
}
