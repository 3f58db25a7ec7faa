//! In-process queue events.
//!
//! Broadcast by the queue manager alongside the durable analytics events so
//! observers can follow deliveries without polling storage.

use serde::{Deserialize, Serialize};

use super::models::DeliveryResult;

/// Broadcast channel capacity for queue events.
pub(crate) const QUEUE_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// At least one channel accepted the notification.
    Sent {
        notification_id: String,
        user_id: String,
        results: Vec<DeliveryResult>,
    },
    /// Every channel failed; the notification re-enters the lane later.
    RetryScheduled {
        notification_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    /// Retry budget exhausted; the notification is terminally failed.
    Failed {
        notification_id: String,
        user_id: String,
        retry_count: u32,
        failure_reasons: Vec<String>,
    },
    BatchCreated {
        batch_id: String,
        user_id: String,
        category: String,
        notification_ids: Vec<String>,
    },
    /// Batch persistence failed; members were moved to the immediate lane.
    BatchFallback {
        user_id: String,
        category: String,
        notification_count: usize,
        error: String,
    },
}

impl QueueEvent {
    /// Notification ids this event concerns.
    pub fn notification_ids(&self) -> Vec<&str> {
        match self {
            Self::Sent {
                notification_id, ..
            }
            | Self::RetryScheduled {
                notification_id, ..
            }
            | Self::Failed {
                notification_id, ..
            } => vec![notification_id.as_str()],
            Self::BatchCreated {
                notification_ids, ..
            } => notification_ids.iter().map(String::as_str).collect(),
            Self::BatchFallback { .. } => Vec::new(),
        }
    }
}
