//! Throttled dispatcher.
//!
//! A single worker drains the immediate lane in FIFO order, spacing
//! dispatch starts by the throttle interval. The worker parks on a
//! [`Notify`] while the lane is empty, so an idle engine costs nothing.
//!
//! Each notification is fanned out across its channels. One success is
//! enough for the notification to count as sent; when every channel fails
//! the retry policy decides between a delayed re-entry at the back of the
//! lane and terminal failure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{Notify, broadcast};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channels::DeliveryAdapters;
use super::events::QueueEvent;
use super::models::{
    DeliveryResult, Notification, NotificationEventKind, NotificationStatus, TrackedEvent,
};
use super::retry::{RetryDecision, RetryPolicy};
use super::throttle::Throttle;
use crate::database::repositories::NotificationRepository;

/// The immediate lane: an unbounded FIFO shared by producers, the batch
/// fallback path, pending retries and the dispatch worker.
#[derive(Debug, Default)]
pub struct ImmediateLane {
    queue: Mutex<VecDeque<Notification>>,
    wake: Notify,
}

impl ImmediateLane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notification: Notification) {
        self.queue.lock().push_back(notification);
        self.wake.notify_one();
    }

    /// Append several notifications, preserving their order.
    pub fn extend(&self, notifications: impl IntoIterator<Item = Notification>) {
        self.queue.lock().extend(notifications);
        self.wake.notify_one();
    }

    fn pop(&self) -> Option<Notification> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

pub struct ThrottledDispatcher {
    lane: Arc<ImmediateLane>,
    throttle: Throttle,
    processing: AtomicBool,
    adapters: DeliveryAdapters,
    repository: Arc<dyn NotificationRepository>,
    retry_policy: RetryPolicy,
    event_tx: broadcast::Sender<QueueEvent>,
    cancellation_token: CancellationToken,
}

impl ThrottledDispatcher {
    pub fn new(
        lane: Arc<ImmediateLane>,
        throttle: Throttle,
        adapters: DeliveryAdapters,
        repository: Arc<dyn NotificationRepository>,
        retry_policy: RetryPolicy,
        event_tx: broadcast::Sender<QueueEvent>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            lane,
            throttle,
            processing: AtomicBool::new(false),
            adapters,
            repository,
            retry_policy,
            event_tx,
            cancellation_token,
        }
    }

    /// Whether a notification is being delivered right now.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Run the dispatch loop until cancelled.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_ms = self.throttle.interval().as_millis() as u64,
            "Dispatch loop started"
        );

        // The head stays in the lane while waiting for a slot, so it is
        // counted in the lane depth until dispatch begins.
        while self.wait_for_work().await {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = self.throttle.acquire() => {}
            }

            self.processing.store(true, Ordering::SeqCst);
            if let Some(notification) = self.lane.pop() {
                self.dispatch(notification).await;
            }
            self.processing.store(false, Ordering::SeqCst);
        }

        info!(remaining = self.lane.len(), "Dispatch loop stopped");
    }

    /// Wait until the lane has work. `false` once cancelled.
    async fn wait_for_work(&self) -> bool {
        loop {
            if self.cancellation_token.is_cancelled() {
                return false;
            }
            if !self.lane.is_empty() {
                return true;
            }
            tokio::select! {
                _ = self.cancellation_token.cancelled() => return false,
                _ = self.lane.wake.notified() => {}
            }
        }
    }

    /// Deliver one notification and settle its outcome.
    pub async fn dispatch(&self, notification: Notification) {
        debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            channels = notification.channels.len(),
            "Dispatching notification"
        );

        let results = self.adapters.deliver_all(&notification).await;

        if results.iter().any(|r| r.success) {
            self.record_sent(notification, results).await;
        } else {
            self.record_failure(notification, results).await;
        }
    }

    async fn record_sent(&self, mut notification: Notification, results: Vec<DeliveryResult>) {
        notification.status = NotificationStatus::Sent;

        if let Err(e) = self
            .repository
            .update_notification_status(
                &notification.id,
                NotificationStatus::Sent,
                Some(&notification.metadata),
            )
            .await
        {
            warn!(notification_id = %notification.id, error = %e, "Failed to persist sent status");
        }

        let event = TrackedEvent {
            notification_id: notification.id.clone(),
            user_id: notification.user_id.clone(),
            event: NotificationEventKind::Sent,
            metadata: json!({
                "channels": notification.channels,
                "results": results,
                "retry_count": notification.metadata.retry_count,
            }),
        };
        if let Err(e) = self.repository.track_notification_event(&event).await {
            warn!(notification_id = %notification.id, error = %e, "Failed to track sent event");
        }

        let failed = results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            info!(
                notification_id = %notification.id,
                failed_channels = failed,
                "Notification partially delivered"
            );
        } else {
            debug!(notification_id = %notification.id, "Notification sent");
        }

        let _ = self.event_tx.send(QueueEvent::Sent {
            notification_id: notification.id,
            user_id: notification.user_id,
            results,
        });
    }

    async fn record_failure(&self, mut notification: Notification, results: Vec<DeliveryResult>) {
        notification.metadata.retry_count += 1;
        notification
            .metadata
            .failure_reasons
            .push(failure_reason(notification.metadata.retry_count, &results));

        match self.retry_policy.decide(notification.metadata.retry_count) {
            RetryDecision::Retry { attempt, delay } => {
                if let Err(e) = self
                    .repository
                    .update_notification_status(
                        &notification.id,
                        NotificationStatus::Pending,
                        Some(&notification.metadata),
                    )
                    .await
                {
                    warn!(notification_id = %notification.id, error = %e, "Failed to persist retry state");
                }

                info!(
                    notification_id = %notification.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Delivery failed on every channel, scheduling retry"
                );

                let _ = self.event_tx.send(QueueEvent::RetryScheduled {
                    notification_id: notification.id.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });

                let lane = Arc::clone(&self.lane);
                let cancellation_token = self.cancellation_token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancellation_token.cancelled() => {}
                        _ = sleep(delay) => lane.push(notification),
                    }
                });
            }
            RetryDecision::GiveUp { attempts } => {
                notification.status = NotificationStatus::Failed;

                if let Err(e) = self
                    .repository
                    .update_notification_status(
                        &notification.id,
                        NotificationStatus::Failed,
                        Some(&notification.metadata),
                    )
                    .await
                {
                    warn!(notification_id = %notification.id, error = %e, "Failed to persist failed status");
                }

                let event = TrackedEvent {
                    notification_id: notification.id.clone(),
                    user_id: notification.user_id.clone(),
                    event: NotificationEventKind::Failed,
                    metadata: json!({
                        "retry_count": notification.metadata.retry_count,
                        "failure_reasons": notification.metadata.failure_reasons,
                    }),
                };
                if let Err(e) = self.repository.track_notification_event(&event).await {
                    warn!(notification_id = %notification.id, error = %e, "Failed to track failed event");
                }

                warn!(
                    notification_id = %notification.id,
                    user_id = %notification.user_id,
                    attempts,
                    "Notification permanently failed"
                );

                let _ = self.event_tx.send(QueueEvent::Failed {
                    notification_id: notification.id,
                    user_id: notification.user_id,
                    retry_count: notification.metadata.retry_count,
                    failure_reasons: notification.metadata.failure_reasons,
                });
            }
        }
    }
}

/// One line per failed attempt, e.g. `attempt 2: push: timeout; email: bounced`.
fn failure_reason(attempt: u32, results: &[DeliveryResult]) -> String {
    let details: Vec<String> = results
        .iter()
        .map(|r| {
            format!(
                "{}: {}",
                r.channel,
                r.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect();
    format!("attempt {}: {}", attempt, details.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::models::{ChannelKind, NotificationPriority};

    fn notification(title: &str) -> Notification {
        Notification::new("u1", "event", NotificationPriority::High, title, "m")
    }

    #[test]
    fn test_lane_is_fifo() {
        let lane = ImmediateLane::new();
        lane.push(notification("a").with_id("a"));
        lane.extend([notification("b").with_id("b"), notification("c").with_id("c")]);

        assert_eq!(lane.len(), 3);
        let drained: Vec<String> = std::iter::from_fn(|| lane.pop()).map(|n| n.id).collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert!(lane.is_empty());
    }

    #[test]
    fn test_failure_reason_lists_every_channel() {
        let results = vec![
            DeliveryResult::failed(ChannelKind::Push, "device unreachable"),
            DeliveryResult::failed(ChannelKind::Email, "channel not configured"),
        ];
        assert_eq!(
            failure_reason(1, &results),
            "attempt 1: push: device unreachable; email: channel not configured"
        );
    }
}
