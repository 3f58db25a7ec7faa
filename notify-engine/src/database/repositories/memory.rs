//! In-process notification repository.
//!
//! Keeps rows in memory behind `parking_lot` locks. Used for embedding the
//! engine without a database and as the storage double in tests, where the
//! fault switches simulate failing persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::NotificationRepository;
use crate::notification::models::{
    NewNotificationBatch, Notification, NotificationBatch, NotificationBatchUpdate,
    NotificationMetadata, NotificationStatus, TrackedEvent,
};
use crate::{Error, Result};

#[derive(Default)]
pub struct MemoryNotificationRepository {
    notifications: RwLock<HashMap<String, Notification>>,
    batches: RwLock<Vec<NotificationBatch>>,
    events: RwLock<Vec<TrackedEvent>>,
    fail_batch_creation: AtomicBool,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create_notification_batch` call fail.
    pub fn set_fail_batch_creation(&self, fail: bool) {
        self.fail_batch_creation.store(fail, Ordering::SeqCst);
    }

    /// All batches created so far, in creation order.
    pub fn batches(&self) -> Vec<NotificationBatch> {
        self.batches.read().clone()
    }

    /// All analytics events recorded so far, in order.
    pub fn events(&self) -> Vec<TrackedEvent> {
        self.events.read().clone()
    }

    pub fn notification(&self, id: &str) -> Option<Notification> {
        self.notifications.read().get(id).cloned()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        let mut notifications = self.notifications.write();
        if notifications.contains_key(&notification.id) {
            return Err(Error::Database(format!(
                "notification {} already exists",
                notification.id
            )));
        }
        notifications.insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: &str) -> Result<Notification> {
        self.notification(id)
            .ok_or_else(|| Error::not_found("Notification", id))
    }

    async fn get_pending_notifications(&self, limit: u32) -> Result<Vec<Notification>> {
        let mut pending: Vec<Notification> = self
            .notifications
            .read()
            .values()
            .filter(|n| n.status == NotificationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|n| n.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn update_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
        metadata: Option<&NotificationMetadata>,
    ) -> Result<()> {
        let mut notifications = self.notifications.write();
        let notification = notifications
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Notification", id))?;

        notification.status.check_transition(status)?;
        notification.status = status;
        if let Some(metadata) = metadata {
            notification.metadata = metadata.clone();
        }
        Ok(())
    }

    async fn create_notification_batch(
        &self,
        batch: &NewNotificationBatch,
    ) -> Result<NotificationBatch> {
        if self.fail_batch_creation.load(Ordering::SeqCst) {
            return Err(Error::Database("batch storage unavailable".to_string()));
        }

        let created = NotificationBatch {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: batch.user_id.clone(),
            category: batch.category.clone(),
            title: batch.title.clone(),
            summary: batch.summary.clone(),
            notification_count: batch.notification_count,
            priority: batch.priority,
            scheduled_for: batch.scheduled_for,
            sent_at: None,
        };
        self.batches.write().push(created.clone());
        Ok(created)
    }

    async fn update_notification_batch(
        &self,
        id: &str,
        update: &NotificationBatchUpdate,
    ) -> Result<()> {
        let mut batches = self.batches.write();
        let batch = batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| Error::not_found("NotificationBatch", id))?;
        if update.sent_at.is_some() {
            batch.sent_at = update.sent_at;
        }
        if let Some(count) = update.notification_count {
            batch.notification_count = count;
        }
        Ok(())
    }

    async fn get_notification_batch(&self, id: &str) -> Result<NotificationBatch> {
        self.batches
            .read()
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("NotificationBatch", id))
    }

    async fn list_batch_notifications(&self, batch_id: &str) -> Result<Vec<Notification>> {
        let mut members: Vec<Notification> = self
            .notifications
            .read()
            .values()
            .filter(|n| n.metadata.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect();
        members.sort_by_key(|n| n.created_at);
        Ok(members)
    }

    async fn track_notification_event(&self, event: &TrackedEvent) -> Result<()> {
        self.events.write().push(event.clone());
        Ok(())
    }
}
