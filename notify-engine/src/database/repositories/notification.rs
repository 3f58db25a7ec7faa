//! Notification repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::database::models::{
    NotificationBatchDbModel, NotificationDbModel, NotificationEventDbModel,
};
use crate::notification::models::{
    NewNotificationBatch, Notification, NotificationBatch, NotificationBatchUpdate,
    NotificationMetadata, NotificationStatus, TrackedEvent,
};
use crate::{Error, Result};

/// Notification repository trait.
///
/// The queue manager is the only caller that mutates delivery state; the
/// repository is the only writer of durable rows.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    // Notifications
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;
    async fn get_notification(&self, id: &str) -> Result<Notification>;
    async fn get_pending_notifications(&self, limit: u32) -> Result<Vec<Notification>>;
    /// Move a notification forward. Backward transitions are rejected with
    /// [`Error::InvalidStateTransition`].
    async fn update_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
        metadata: Option<&NotificationMetadata>,
    ) -> Result<()>;

    // Batches
    async fn create_notification_batch(
        &self,
        batch: &NewNotificationBatch,
    ) -> Result<NotificationBatch>;
    async fn update_notification_batch(
        &self,
        id: &str,
        update: &NotificationBatchUpdate,
    ) -> Result<()>;
    async fn get_notification_batch(&self, id: &str) -> Result<NotificationBatch>;
    async fn list_batch_notifications(&self, batch_id: &str) -> Result<Vec<Notification>>;

    // Analytics
    async fn track_notification_event(&self, event: &TrackedEvent) -> Result<()>;
}

/// SQLx implementation of NotificationRepository.
pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Analytics events recorded for one notification, oldest first.
    pub async fn list_events(&self, notification_id: &str) -> Result<Vec<NotificationEventDbModel>> {
        let events = sqlx::query_as::<_, NotificationEventDbModel>(
            "SELECT * FROM notification_event WHERE notification_id = ? ORDER BY id",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        let row = NotificationDbModel::from_domain(notification)?;
        sqlx::query(
            r#"
            INSERT INTO notification (
                id, user_id, category, priority, title, message, data,
                channels, status, metadata, batch_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.category)
        .bind(&row.priority)
        .bind(&row.title)
        .bind(&row.message)
        .bind(&row.data)
        .bind(&row.channels)
        .bind(&row.status)
        .bind(&row.metadata)
        .bind(&row.batch_id)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_notification(&self, id: &str) -> Result<Notification> {
        sqlx::query_as::<_, NotificationDbModel>("SELECT * FROM notification WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Notification", id))?
            .try_into()
    }

    async fn get_pending_notifications(&self, limit: u32) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationDbModel>(
            "SELECT * FROM notification WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn update_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
        metadata: Option<&NotificationMetadata>,
    ) -> Result<()> {
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        let batch_id = metadata.and_then(|m| m.batch_id.clone());

        // Only pending rows (or a re-assert of the same status) may change.
        let result = sqlx::query(
            r#"
            UPDATE notification
            SET status = ?,
                metadata = COALESCE(?, metadata),
                batch_id = COALESCE(?, batch_id),
                updated_at = ?
            WHERE id = ? AND (status = 'pending' OR status = ?)
            "#,
        )
        .bind(status.to_string())
        .bind(metadata_json)
        .bind(batch_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(status.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_notification(id).await?;
            return current.status.check_transition(status);
        }
        Ok(())
    }

    async fn create_notification_batch(
        &self,
        batch: &NewNotificationBatch,
    ) -> Result<NotificationBatch> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO notification_batch (
                id, user_id, category, title, summary, notification_count,
                priority, scheduled_for, sent_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&id)
        .bind(&batch.user_id)
        .bind(&batch.category)
        .bind(&batch.title)
        .bind(&batch.summary)
        .bind(i64::from(batch.notification_count))
        .bind(batch.priority.to_string())
        .bind(batch.scheduled_for.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(NotificationBatch {
            id,
            user_id: batch.user_id.clone(),
            category: batch.category.clone(),
            title: batch.title.clone(),
            summary: batch.summary.clone(),
            notification_count: batch.notification_count,
            priority: batch.priority,
            scheduled_for: batch.scheduled_for,
            sent_at: None,
        })
    }

    async fn update_notification_batch(
        &self,
        id: &str,
        update: &NotificationBatchUpdate,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE notification_batch SET sent_at = COALESCE(?, sent_at), notification_count = COALESCE(?, notification_count) WHERE id = ?",
        )
        .bind(update.sent_at.map(|t| t.to_rfc3339()))
        .bind(update.notification_count.map(i64::from))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("NotificationBatch", id));
        }
        Ok(())
    }

    async fn get_notification_batch(&self, id: &str) -> Result<NotificationBatch> {
        sqlx::query_as::<_, NotificationBatchDbModel>(
            "SELECT * FROM notification_batch WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("NotificationBatch", id))?
        .try_into()
    }

    async fn list_batch_notifications(&self, batch_id: &str) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationDbModel>(
            "SELECT * FROM notification WHERE batch_id = ? ORDER BY created_at ASC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn track_notification_event(&self, event: &TrackedEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_event (notification_id, user_id, event, metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.notification_id)
        .bind(&event.user_id)
        .bind(event.event.to_string())
        .bind(serde_json::to_string(&event.metadata)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
