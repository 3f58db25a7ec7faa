//! Email notification channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::NotificationChannel;
use crate::Result;
use crate::notification::models::{ChannelKind, Notification, NotificationPriority};

/// Rendered email handed to the email transport. Address resolution from
/// `user_id` belongs to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub notification_id: String,
    pub user_id: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Email collaborator.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<()>;
}

/// Email notification channel.
pub struct EmailChannel {
    transport: Arc<dyn EmailTransport>,
}

impl EmailChannel {
    pub fn new(transport: Arc<dyn EmailTransport>) -> Self {
        Self { transport }
    }

    /// Build the email subject.
    fn build_subject(&self, notification: &Notification) -> String {
        match notification.priority {
            NotificationPriority::Critical => format!("[Urgent] {}", notification.title),
            _ => notification.title.clone(),
        }
    }

    /// Build the email body (plain text).
    fn build_body_text(&self, notification: &Notification) -> String {
        format!(
            "{}\n\n{}\n\nCategory: {}\nTime: {}",
            notification.title,
            notification.message,
            notification.category,
            notification.created_at.to_rfc3339()
        )
    }

    /// Build the email body (HTML).
    fn build_body_html(&self, notification: &Notification) -> String {
        let accent = match notification.priority {
            NotificationPriority::Low => "#808080",
            NotificationPriority::Medium => "#3498db",
            NotificationPriority::High => "#f39c12",
            NotificationPriority::Critical => "#e74c3c",
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; margin: 20px;">
    <div style="border-left: 4px solid {}; padding: 10px 15px;">
        <h2>{}</h2>
        <p>{}</p>
    </div>
    <p style="color: #666; font-size: 12px;">{} | {}</p>
</body>
</html>"#,
            accent,
            html_escape::encode_text(&notification.title),
            html_escape::encode_text(&notification.message),
            html_escape::encode_text(&notification.category),
            notification.created_at.to_rfc3339()
        )
    }

    fn render(&self, notification: &Notification) -> EmailMessage {
        EmailMessage {
            notification_id: notification.id.clone(),
            user_id: notification.user_id.clone(),
            subject: self.build_subject(notification),
            text_body: self.build_body_text(notification),
            html_body: self.build_body_html(notification),
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = self.render(notification);
        self.transport.send_email(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;

    #[async_trait]
    impl EmailTransport for NullTransport {
        async fn send_email(&self, _message: &EmailMessage) -> Result<()> {
            Ok(())
        }
    }

    fn channel() -> EmailChannel {
        EmailChannel::new(Arc::new(NullTransport))
    }

    #[test]
    fn test_build_subject() {
        let n = Notification::new("u1", "event", NotificationPriority::Critical, "Room change", "B12");
        assert_eq!(channel().build_subject(&n), "[Urgent] Room change");

        let n = Notification::new("u1", "event", NotificationPriority::Low, "Room change", "B12");
        assert_eq!(channel().build_subject(&n), "Room change");
    }

    #[test]
    fn test_html_body_is_escaped() {
        let n = Notification::new(
            "u1",
            "forum",
            NotificationPriority::Medium,
            "<script>",
            "a & b",
        );
        let message = channel().render(&n);
        assert!(message.html_body.contains("&lt;script&gt;"));
        assert!(message.html_body.contains("a &amp; b"));
        assert!(message.text_body.contains("Category: forum"));
    }
}
