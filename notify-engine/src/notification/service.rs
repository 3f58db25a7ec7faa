//! Notification queue manager.
//!
//! The `NotificationQueueManager` is responsible for:
//! - Routing each incoming notification to the batch aggregator or the
//!   immediate lane
//! - Owning the dispatch loop and batch timers
//! - Recovering pending notifications from storage on startup
//! - Reporting queue statistics

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch::BatchAggregator;
use super::channels::DeliveryAdapters;
use super::dispatcher::{ImmediateLane, ThrottledDispatcher};
use super::events::{QUEUE_EVENT_CAPACITY, QueueEvent};
use super::models::Notification;
use super::retry::RetryPolicy;
use super::throttle::Throttle;
use crate::config::QueueConfig;
use crate::database::repositories::NotificationRepository;
use crate::{Error, Result};

/// Where `enqueue_notification` placed a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnqueueRoute {
    Batched,
    Immediate,
}

/// Runtime statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub immediate_queue_depth: usize,
    /// Open batch sizes keyed `"<user>:<category>"`.
    pub batch_queues: BTreeMap<String, usize>,
    /// Whether a notification is being delivered right now.
    pub processing: bool,
    pub config: QueueConfig,
}

pub struct NotificationQueueManager {
    config: QueueConfig,
    repository: Arc<dyn NotificationRepository>,
    lane: Arc<ImmediateLane>,
    dispatcher: Arc<ThrottledDispatcher>,
    aggregator: Arc<BatchAggregator>,
    event_tx: broadcast::Sender<QueueEvent>,
    cancellation_token: CancellationToken,
    initialized: AtomicBool,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationQueueManager {
    /// Create a manager. Nothing runs until [`initialize`](Self::initialize).
    pub fn new(
        config: QueueConfig,
        repository: Arc<dyn NotificationRepository>,
        adapters: DeliveryAdapters,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(QUEUE_EVENT_CAPACITY);
        let cancellation_token = CancellationToken::new();
        let lane = Arc::new(ImmediateLane::new());

        let dispatcher = Arc::new(ThrottledDispatcher::new(
            Arc::clone(&lane),
            Throttle::new(config.throttle_interval()),
            adapters,
            Arc::clone(&repository),
            RetryPolicy::new(&config),
            event_tx.clone(),
            cancellation_token.clone(),
        ));

        let aggregator = Arc::new(BatchAggregator::new(
            config.max_batch_size,
            config.batch_timeout(),
            Arc::clone(&repository),
            Arc::clone(&lane),
            event_tx.clone(),
            cancellation_token.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            repository,
            lane,
            dispatcher,
            aggregator,
            event_tx,
            cancellation_token,
            initialized: AtomicBool::new(false),
            dispatch_handle: Mutex::new(None),
        }))
    }

    /// Start the dispatch loop and re-enqueue pending notifications from
    /// storage. Returns the number recovered; later calls return 0.
    ///
    /// Recovery is at-least-once: a notification interrupted mid-delivery
    /// is still pending and gets delivered again.
    pub async fn initialize(&self) -> Result<usize> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Queue manager already initialized");
            return Ok(0);
        }

        let handle = tokio::spawn(Arc::clone(&self.dispatcher).run());
        *self.dispatch_handle.lock() = Some(handle);

        let pending = self
            .repository
            .get_pending_notifications(self.config.recovery_limit)
            .await?;

        let mut recovered = 0;
        for notification in pending {
            let id = notification.id.clone();
            match self.enqueue_notification(notification) {
                Ok(_) => recovered += 1,
                Err(e) => warn!(notification_id = %id, error = %e, "Skipping unrecoverable notification"),
            }
        }

        info!(
            recovered,
            throttle_rate = self.config.throttle_rate_per_second,
            max_batch_size = self.config.max_batch_size,
            "Notification queue manager initialized"
        );
        Ok(recovered)
    }

    /// Route a notification. Returns immediately; delivery happens in the
    /// background. Must be called from within a Tokio runtime.
    pub fn enqueue_notification(&self, notification: Notification) -> Result<EnqueueRoute> {
        if self.cancellation_token.is_cancelled() {
            return Err(Error::Other("notification queue is shut down".to_string()));
        }
        notification.validate()?;

        let route = if notification.is_batchable() {
            EnqueueRoute::Batched
        } else {
            EnqueueRoute::Immediate
        };

        debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            category = %notification.category,
            priority = %notification.priority,
            route = %route,
            "Enqueued notification"
        );

        match route {
            EnqueueRoute::Batched => self.aggregator.add(notification),
            EnqueueRoute::Immediate => self.lane.push(notification),
        }
        Ok(route)
    }

    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            immediate_queue_depth: self.lane.len(),
            batch_queues: self.aggregator.queue_sizes(),
            processing: self.dispatcher.is_processing(),
            config: self.config.clone(),
        }
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the dispatch loop, batch timers and pending retries.
    ///
    /// Undelivered notifications stay pending in storage.
    pub async fn shutdown(&self) {
        info!("Stopping notification queue manager");
        self.cancellation_token.cancel();

        let handle = self.dispatch_handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Dispatch loop ended abnormally");
        }

        info!(
            immediate = self.lane.len(),
            batched = self.aggregator.queue_sizes().values().sum::<usize>(),
            "Notification queue manager stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::MemoryNotificationRepository;
    use crate::notification::models::NotificationPriority;

    fn manager() -> Arc<NotificationQueueManager> {
        NotificationQueueManager::new(
            QueueConfig::default(),
            Arc::new(MemoryNotificationRepository::new()),
            DeliveryAdapters::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = NotificationQueueManager::new(
            QueueConfig {
                throttle_rate_per_second: 0,
                ..Default::default()
            },
            Arc::new(MemoryNotificationRepository::new()),
            DeliveryAdapters::new(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_routing() {
        let manager = manager();

        let low = Notification::new("u1", "forum", NotificationPriority::Low, "t", "m")
            .batch_eligible(true);
        let not_eligible = Notification::new("u1", "forum", NotificationPriority::Low, "t", "m");
        let critical = Notification::new("u1", "forum", NotificationPriority::Critical, "t", "m")
            .batch_eligible(true);

        assert_eq!(manager.enqueue_notification(low).unwrap(), EnqueueRoute::Batched);
        assert_eq!(
            manager.enqueue_notification(not_eligible).unwrap(),
            EnqueueRoute::Immediate
        );
        assert_eq!(
            manager.enqueue_notification(critical).unwrap(),
            EnqueueRoute::Immediate
        );

        let stats = manager.queue_stats();
        assert_eq!(stats.immediate_queue_depth, 2);
        assert_eq!(stats.batch_queues.get("u1:forum"), Some(&1));
        assert!(!stats.processing);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_rejected() {
        let manager = manager();
        manager.initialize().await.unwrap();
        manager.shutdown().await;

        let n = Notification::new("u1", "event", NotificationPriority::High, "t", "m");
        assert!(manager.enqueue_notification(n).is_err());
    }

    #[tokio::test]
    async fn test_initialize_twice_is_noop() {
        let manager = manager();
        assert_eq!(manager.initialize().await.unwrap(), 0);
        assert_eq!(manager.initialize().await.unwrap(), 0);
        manager.shutdown().await;
    }
}
