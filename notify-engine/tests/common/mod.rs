#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use notify_engine::config::QueueConfig;
use notify_engine::database::{MemoryNotificationRepository, NotificationRepository};
use notify_engine::notification::{
    ChannelKind, DeliveryAdapters, Notification, NotificationChannel, NotificationPriority,
    NotificationQueueManager, QueueEvent,
};
use notify_engine::{Error, Result};

/// Channel that fails its first `failures` sends, then succeeds.
pub struct ScriptedChannel {
    kind: ChannelKind,
    failures: u32,
    attempts: AtomicU32,
    sent: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedChannel {
    pub fn healthy(kind: ChannelKind) -> Arc<Self> {
        Self::failing_first(kind, 0)
    }

    pub fn broken(kind: ChannelKind) -> Arc<Self> {
        Self::failing_first(kind, u32::MAX)
    }

    pub fn failing_first(kind: ChannelKind, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            kind,
            failures,
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Ids delivered successfully, in order, with the time of delivery.
    pub fn sent(&self) -> Vec<(String, Instant)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationChannel for ScriptedChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(Error::transport(
                self.kind.as_str(),
                format!("scripted failure #{}", attempt + 1),
            ));
        }
        self.sent
            .lock()
            .push((notification.id.clone(), Instant::now()));
        Ok(())
    }
}

pub struct Harness {
    pub manager: Arc<NotificationQueueManager>,
    pub repository: Arc<MemoryNotificationRepository>,
    pub events: broadcast::Receiver<QueueEvent>,
}

impl Harness {
    pub fn new(config: QueueConfig, adapters: DeliveryAdapters) -> Self {
        let repository = Arc::new(MemoryNotificationRepository::new());
        let manager =
            NotificationQueueManager::new(config, repository.clone(), adapters).unwrap();
        let events = manager.subscribe();
        Self {
            manager,
            repository,
            events,
        }
    }

    /// Persist, then enqueue.
    pub async fn submit(&self, notification: Notification) {
        self.repository
            .insert_notification(&notification)
            .await
            .unwrap();
        self.manager.enqueue_notification(notification).unwrap();
    }

    /// Next queue event, failing the test if none arrives in time.
    pub async fn next_event(&mut self) -> QueueEvent {
        tokio::time::timeout(Duration::from_secs(600), self.events.recv())
            .await
            .expect("timed out waiting for queue event")
            .expect("event channel closed")
    }

    /// Collect events until `done` returns true for one of them.
    pub async fn events_until(&mut self, done: impl Fn(&QueueEvent) -> bool) -> Vec<QueueEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }
}

pub fn fast_config() -> QueueConfig {
    QueueConfig {
        max_batch_size: 10,
        batch_timeout_ms: 1_000,
        max_retries: 3,
        retry_delay_ms: 500,
        throttle_rate_per_second: 10,
        ..Default::default()
    }
}

pub fn batchable(user: &str, category: &str, n: usize) -> Notification {
    Notification::new(
        user,
        category,
        NotificationPriority::Medium,
        format!("{} update {}", category, n),
        "body",
    )
    .with_id(format!("{}-{}-{}", user, category, n))
    .batch_eligible(true)
}

pub fn immediate(id: &str, channels: &[ChannelKind]) -> Notification {
    Notification::new("u1", "event", NotificationPriority::High, id, "body")
        .with_id(id)
        .with_channels(channels.iter().copied())
}
