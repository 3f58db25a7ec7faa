//! Notification database models.
//!
//! Rows store timestamps as RFC 3339 text and structured fields as JSON text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::notification::models::{
    ChannelKind, Notification, NotificationBatch, NotificationMetadata, NotificationPriority,
    NotificationStatus,
};
use crate::{Error, Result};

/// Notification database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationDbModel {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub priority: String,
    pub title: String,
    pub message: String,
    /// JSON payload, if any.
    pub data: Option<String>,
    /// JSON array of channel names.
    pub channels: String,
    pub status: String,
    /// JSON-encoded [`NotificationMetadata`].
    pub metadata: String,
    pub batch_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl NotificationDbModel {
    pub fn from_domain(notification: &Notification) -> Result<Self> {
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            id: notification.id.clone(),
            user_id: notification.user_id.clone(),
            category: notification.category.clone(),
            priority: notification.priority.to_string(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            data: notification
                .data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            channels: serde_json::to_string(&notification.channels)?,
            status: notification.status.to_string(),
            metadata: serde_json::to_string(&notification.metadata)?,
            batch_id: notification.metadata.batch_id.clone(),
            created_at: notification.created_at.to_rfc3339(),
            updated_at: now,
        })
    }
}

impl TryFrom<NotificationDbModel> for Notification {
    type Error = Error;

    fn try_from(row: NotificationDbModel) -> Result<Self> {
        let mut metadata: NotificationMetadata = serde_json::from_str(&row.metadata)?;
        if metadata.batch_id.is_none() {
            metadata.batch_id = row.batch_id;
        }
        let channels: Vec<ChannelKind> = serde_json::from_str(&row.channels)?;

        Ok(Self {
            priority: parse_enum::<NotificationPriority>("priority", &row.priority)?,
            status: parse_enum::<NotificationStatus>("status", &row.status)?,
            data: row.data.as_deref().map(serde_json::from_str).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            id: row.id,
            user_id: row.user_id,
            category: row.category,
            title: row.title,
            message: row.message,
            channels,
            metadata,
        })
    }
}

/// Notification batch database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationBatchDbModel {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub title: String,
    pub summary: String,
    pub notification_count: i64,
    pub priority: String,
    pub scheduled_for: String,
    pub sent_at: Option<String>,
}

impl TryFrom<NotificationBatchDbModel> for NotificationBatch {
    type Error = Error;

    fn try_from(row: NotificationBatchDbModel) -> Result<Self> {
        Ok(Self {
            notification_count: u32::try_from(row.notification_count).map_err(|_| {
                Error::Database(format!(
                    "batch {} has invalid notification_count {}",
                    row.id, row.notification_count
                ))
            })?,
            priority: parse_enum::<NotificationPriority>("priority", &row.priority)?,
            scheduled_for: parse_timestamp(&row.scheduled_for)?,
            sent_at: row.sent_at.as_deref().map(parse_timestamp).transpose()?,
            id: row.id,
            user_id: row.user_id,
            category: row.category,
            title: row.title,
            summary: row.summary,
        })
    }
}

/// Analytics event database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationEventDbModel {
    pub id: i64,
    pub notification_id: String,
    pub user_id: String,
    pub event: String,
    pub metadata: String,
    pub created_at: String,
}

fn parse_enum<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| Error::Database(format!("unknown {field} value: {raw}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("invalid timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_row_conversion() {
        let notification = Notification::new(
            "user-1",
            "forum",
            NotificationPriority::Low,
            "New reply",
            "Someone replied to your thread",
        )
        .with_channels([ChannelKind::Push, ChannelKind::InApp])
        .with_data(serde_json::json!({ "thread_id": 42 }))
        .batch_eligible(true);

        let row = NotificationDbModel::from_domain(&notification).unwrap();
        assert_eq!(row.priority, "low");
        assert_eq!(row.status, "pending");
        assert_eq!(row.channels, r#"["push","in_app"]"#);

        let restored = Notification::try_from(row).unwrap();
        assert_eq!(restored, notification);
    }

    #[test]
    fn test_batch_row_rejects_unknown_priority() {
        let row = NotificationBatchDbModel {
            id: "b1".to_string(),
            user_id: "u1".to_string(),
            category: "event".to_string(),
            title: "2 event updates".to_string(),
            summary: "a, b".to_string(),
            notification_count: 2,
            priority: "urgent".to_string(),
            scheduled_for: Utc::now().to_rfc3339(),
            sent_at: None,
        };
        assert!(NotificationBatch::try_from(row).is_err());
    }
}
