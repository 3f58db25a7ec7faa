//! Batch aggregator.
//!
//! Coalesces low-urgency notifications per (user, category). A batch fires
//! when it reaches `max_batch_size` or `batch_timeout` after its first
//! member arrived, whichever comes first.
//!
//! Each open queue carries a generation number and a timer token. Both
//! triggers remove the queue from the map before processing it, and the
//! timer only removes a queue whose generation it was armed for, so a batch
//! is processed exactly once even when both triggers race.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::ImmediateLane;
use super::events::QueueEvent;
use super::models::{
    NewNotificationBatch, Notification, NotificationBatch, NotificationBatchUpdate,
    NotificationEventKind, NotificationPriority, NotificationStatus, TrackedEvent,
};
use crate::database::repositories::NotificationRepository;

/// Number of member titles quoted in a batch summary.
const SUMMARY_TITLE_COUNT: usize = 3;

/// Aggregation key: recipient and category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    pub user_id: String,
    pub category: String,
}

impl BatchKey {
    pub fn of(notification: &Notification) -> Self {
        Self {
            user_id: notification.user_id.clone(),
            category: notification.category.clone(),
        }
    }
}

/// `"<user>:<category>"`. Colons and backslashes inside either part are
/// escaped with a backslash, so distinct keys never render the same.
impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.user_id)?;
        f.write_str(":")?;
        write_escaped(f, &self.category)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, part: &str) -> fmt::Result {
    for c in part.chars() {
        if c == ':' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

/// An open batch queue.
struct BatchQueue {
    notifications: Vec<Notification>,
    generation: u64,
    timer: Option<CancellationToken>,
}

impl BatchQueue {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

pub struct BatchAggregator {
    queues: DashMap<BatchKey, BatchQueue>,
    next_generation: AtomicU64,
    max_batch_size: usize,
    batch_timeout: Duration,
    repository: Arc<dyn NotificationRepository>,
    lane: Arc<ImmediateLane>,
    event_tx: broadcast::Sender<QueueEvent>,
    cancellation_token: CancellationToken,
}

impl BatchAggregator {
    pub fn new(
        max_batch_size: usize,
        batch_timeout: Duration,
        repository: Arc<dyn NotificationRepository>,
        lane: Arc<ImmediateLane>,
        event_tx: broadcast::Sender<QueueEvent>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            queues: DashMap::new(),
            next_generation: AtomicU64::new(1),
            max_batch_size: max_batch_size.max(1),
            batch_timeout,
            repository,
            lane,
            event_tx,
            cancellation_token,
        }
    }

    /// Append a notification to its queue. Never blocks on I/O: a full batch
    /// is processed on a spawned task.
    pub fn add(self: &Arc<Self>, notification: Notification) {
        let key = BatchKey::of(&notification);

        let ready = match self.queues.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().notifications.push(notification);
                if entry.get().notifications.len() >= self.max_batch_size {
                    let mut queue = entry.remove();
                    queue.disarm();
                    Some(queue.notifications)
                } else {
                    None
                }
            }
            Entry::Vacant(entry) => {
                if self.max_batch_size <= 1 {
                    Some(vec![notification])
                } else {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let timer = self.arm_timer(key.clone(), generation);
                    entry.insert(BatchQueue {
                        notifications: vec![notification],
                        generation,
                        timer: Some(timer),
                    });
                    debug!(batch_key = %key, "Opened batch queue");
                    None
                }
            }
        };

        if let Some(notifications) = ready {
            debug!(batch_key = %key, size = notifications.len(), "Batch full");
            let this = Arc::clone(self);
            tokio::spawn(async move { this.process_batch(key, notifications).await });
        }
    }

    fn arm_timer(self: &Arc<Self>, key: BatchKey, generation: u64) -> CancellationToken {
        let timer = self.cancellation_token.child_token();
        let cancelled = timer.clone();
        let timeout = self.batch_timeout;
        let this = Arc::clone(self);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = sleep(timeout) => this.fire_timeout(key, generation).await,
            }
        });

        timer
    }

    async fn fire_timeout(&self, key: BatchKey, generation: u64) {
        let Some((_, queue)) = self
            .queues
            .remove_if(&key, |_, queue| queue.generation == generation)
        else {
            return;
        };

        if queue.notifications.is_empty() {
            return;
        }

        debug!(batch_key = %key, size = queue.notifications.len(), "Batch timeout elapsed");
        self.process_batch(key, queue.notifications).await;
    }

    /// Persist one batch for `notifications` and mark every member sent.
    ///
    /// If the batch cannot be created, members go to the immediate lane
    /// unmodified.
    pub async fn process_batch(&self, key: BatchKey, notifications: Vec<Notification>) {
        let draft = build_batch(&key, &notifications);

        match self.repository.create_notification_batch(&draft).await {
            Ok(batch) => self.settle_batch(key, batch, notifications).await,
            Err(e) => {
                warn!(
                    batch_key = %key,
                    size = notifications.len(),
                    error = %e,
                    "Batch creation failed, falling back to immediate delivery"
                );
                let notification_count = notifications.len();
                self.lane.extend(notifications);
                let _ = self.event_tx.send(QueueEvent::BatchFallback {
                    user_id: key.user_id,
                    category: key.category,
                    notification_count,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Mark members sent under `batch`.
    ///
    /// A member whose status cannot be written does not join the batch: it
    /// goes to the immediate lane and the stored count is corrected, so the
    /// count always matches the rows carrying the batch id.
    async fn settle_batch(
        &self,
        key: BatchKey,
        batch: NotificationBatch,
        notifications: Vec<Notification>,
    ) {
        let mut notification_ids = Vec::with_capacity(notifications.len());
        let mut unsettled = Vec::new();

        for mut notification in notifications {
            let mut metadata = notification.metadata.clone();
            metadata.batch_id = Some(batch.id.clone());

            if let Err(e) = self
                .repository
                .update_notification_status(
                    &notification.id,
                    NotificationStatus::Sent,
                    Some(&metadata),
                )
                .await
            {
                warn!(
                    notification_id = %notification.id,
                    batch_id = %batch.id,
                    error = %e,
                    "Failed to mark batched notification sent, delivering it individually"
                );
                unsettled.push(notification);
                continue;
            }
            notification.metadata = metadata;

            let event = TrackedEvent {
                notification_id: notification.id.clone(),
                user_id: notification.user_id.clone(),
                event: NotificationEventKind::Batched,
                metadata: json!({ "batch_id": batch.id }),
            };
            if let Err(e) = self.repository.track_notification_event(&event).await {
                warn!(notification_id = %notification.id, error = %e, "Failed to track batched event");
            }

            notification_ids.push(notification.id);
        }

        let settled = notification_ids.len() as u32;
        let update = NotificationBatchUpdate {
            sent_at: Some(Utc::now()),
            notification_count: (settled != batch.notification_count).then_some(settled),
        };
        if let Err(e) = self
            .repository
            .update_notification_batch(&batch.id, &update)
            .await
        {
            warn!(batch_id = %batch.id, error = %e, "Failed to update batch record");
        }

        info!(
            batch_id = %batch.id,
            batch_key = %key,
            count = settled,
            "Batch delivered"
        );

        let _ = self.event_tx.send(QueueEvent::BatchCreated {
            batch_id: batch.id,
            user_id: key.user_id,
            category: key.category,
            notification_ids,
        });

        if !unsettled.is_empty() {
            self.lane.extend(unsettled);
        }
    }

    /// Sizes of all open queues keyed by the rendered [`BatchKey`].
    pub fn queue_sizes(&self) -> BTreeMap<String, usize> {
        self.queues
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().notifications.len()))
            .collect()
    }
}

/// Build the batch record for a set of members.
pub fn build_batch(key: &BatchKey, notifications: &[Notification]) -> NewNotificationBatch {
    NewNotificationBatch {
        user_id: key.user_id.clone(),
        category: key.category.clone(),
        title: batch_title(notifications),
        summary: batch_summary(notifications),
        notification_count: notifications.len() as u32,
        priority: batch_priority(notifications),
        scheduled_for: Utc::now(),
    }
}

/// `"<n> <category> updates"` when all members share a category, otherwise
/// `"<n> new updates"`.
pub fn batch_title(notifications: &[Notification]) -> String {
    let count = notifications.len();
    match notifications.first() {
        Some(first)
            if notifications
                .iter()
                .all(|n| n.category == first.category) =>
        {
            format!("{} {} updates", count, first.category)
        }
        _ => format!("{} new updates", count),
    }
}

/// The first three titles, then `"and <n> more..."`.
pub fn batch_summary(notifications: &[Notification]) -> String {
    let titles: Vec<&str> = notifications
        .iter()
        .take(SUMMARY_TITLE_COUNT)
        .map(|n| n.title.as_str())
        .collect();
    let mut summary = titles.join(", ");

    if notifications.len() > SUMMARY_TITLE_COUNT {
        summary.push_str(&format!(
            " and {} more...",
            notifications.len() - SUMMARY_TITLE_COUNT
        ));
    }
    summary
}

/// Highest member priority, low when empty.
pub fn batch_priority(notifications: &[Notification]) -> NotificationPriority {
    notifications
        .iter()
        .map(|n| n.priority)
        .max()
        .unwrap_or(NotificationPriority::Low)
}
