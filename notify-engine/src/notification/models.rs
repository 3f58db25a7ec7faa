//! Notification domain models.
//!
//! Defines the notification record handed over by the decision component,
//! the batch record produced by aggregation, and the structured results the
//! delivery path emits.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Priority level assigned by the decision component.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationPriority {
    /// Informational, happily coalesced.
    Low,
    /// Standard notifications.
    #[default]
    Medium,
    /// Important, always delivered immediately.
    High,
    /// Requires immediate attention.
    Critical,
}

impl NotificationPriority {
    /// High and critical notifications never enter a batch.
    pub fn is_urgent(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// Delivery status of a notification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    /// Whether the status is terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Status only moves forward: pending -> sent | failed.
    ///
    /// Re-asserting the current status is accepted, which lets retry
    /// bookkeeping be stored while a notification is still pending.
    pub fn can_transition_to(self, next: NotificationStatus) -> bool {
        match self {
            Self::Pending => true,
            Self::Sent | Self::Failed => self == next,
        }
    }

    /// Validate a transition, returning an error for backward moves.
    pub fn check_transition(self, next: NotificationStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// Delivery medium.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelKind {
    Push,
    Email,
    InApp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Email => "email",
            Self::InApp => "in_app",
        }
    }
}

/// Control metadata carried alongside a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    /// Set by the decision component when coalescing is acceptable.
    #[serde(default)]
    pub batch_eligible: bool,
    /// Number of failed delivery attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Batch this notification was delivered through, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// One entry per failed delivery attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_reasons: Vec<String>,
    /// Free-form fields supplied upstream, preserved verbatim.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// A unit of information to deliver to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    /// Free-form category, e.g. "event" or "forum".
    pub category: String,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    /// Opaque payload forwarded to transports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub channels: Vec<ChannelKind>,
    #[serde(default)]
    pub status: NotificationStatus,
    #[serde(default)]
    pub metadata: NotificationMetadata,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a pending in-app notification with a fresh id.
    pub fn new(
        user_id: impl Into<String>,
        category: impl Into<String>,
        priority: NotificationPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            category: category.into(),
            priority,
            title: title.into(),
            message: message.into(),
            data: None,
            channels: vec![ChannelKind::InApp],
            status: NotificationStatus::Pending,
            metadata: NotificationMetadata::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = ChannelKind>) -> Self {
        self.channels = channels.into_iter().collect();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn batch_eligible(mut self, eligible: bool) -> Self {
        self.metadata.batch_eligible = eligible;
        self
    }

    /// Whether the notification may be coalesced into a batch.
    ///
    /// Urgent priorities bypass aggregation regardless of the flag.
    pub fn is_batchable(&self) -> bool {
        self.metadata.batch_eligible && !self.priority.is_urgent()
    }

    /// Reject records the delivery path cannot handle.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("notification id must not be empty"));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::validation(format!(
                "notification {} has no recipient",
                self.id
            )));
        }
        if self.channels.is_empty() {
            return Err(Error::validation(format!(
                "notification {} has no delivery channels",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.channels.iter().find(|c| !seen.insert(**c)) {
            return Err(Error::validation(format!(
                "notification {} lists channel {} more than once",
                self.id, dup
            )));
        }
        if self.status.is_terminal() {
            return Err(Error::validation(format!(
                "notification {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// Aggregation of notifications for one user in one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBatch {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub title: String,
    pub summary: String,
    pub notification_count: u32,
    pub priority: NotificationPriority,
    /// Creation time of the batch.
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Fields needed to persist a new batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotificationBatch {
    pub user_id: String,
    pub category: String,
    pub title: String,
    pub summary: String,
    pub notification_count: u32,
    pub priority: NotificationPriority,
    pub scheduled_for: DateTime<Utc>,
}

/// Partial update applied to a persisted batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationBatchUpdate {
    pub sent_at: Option<DateTime<Utc>>,
    pub notification_count: Option<u32>,
}

/// Outcome of one channel send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub channel: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryResult {
    pub fn delivered(channel: ChannelKind) -> Self {
        Self {
            success: true,
            channel,
            error: None,
            delivered_at: Some(Utc::now()),
        }
    }

    pub fn failed(channel: ChannelKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            channel,
            error: Some(error.into()),
            delivered_at: None,
        }
    }
}

/// Analytics event kinds recorded through the persistence layer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationEventKind {
    Sent,
    Failed,
    Batched,
}

/// Analytics record handed to `track_notification_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub notification_id: String,
    pub user_id: String,
    pub event: NotificationEventKind,
    pub metadata: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(NotificationPriority::Low < NotificationPriority::Medium);
        assert!(NotificationPriority::Medium < NotificationPriority::High);
        assert!(NotificationPriority::High < NotificationPriority::Critical);
        assert!(NotificationPriority::Critical.is_urgent());
        assert!(!NotificationPriority::Medium.is_urgent());
    }

    #[test]
    fn test_status_never_moves_backward() {
        assert!(NotificationStatus::Pending.can_transition_to(NotificationStatus::Sent));
        assert!(NotificationStatus::Pending.can_transition_to(NotificationStatus::Failed));
        assert!(!NotificationStatus::Sent.can_transition_to(NotificationStatus::Pending));
        assert!(!NotificationStatus::Failed.can_transition_to(NotificationStatus::Sent));
        assert!(NotificationStatus::Sent
            .check_transition(NotificationStatus::Pending)
            .is_err());
    }

    #[test]
    fn test_critical_is_never_batchable() {
        let n = Notification::new("u1", "event", NotificationPriority::Critical, "t", "m")
            .batch_eligible(true);
        assert!(!n.is_batchable());

        let n = Notification::new("u1", "event", NotificationPriority::Low, "t", "m")
            .batch_eligible(true);
        assert!(n.is_batchable());
    }

    #[test]
    fn test_validate_rejects_duplicate_and_empty_channels() {
        let n = Notification::new("u1", "event", NotificationPriority::Low, "t", "m")
            .with_channels([]);
        assert!(n.validate().is_err());

        let n = Notification::new("u1", "event", NotificationPriority::Low, "t", "m")
            .with_channels([ChannelKind::Push, ChannelKind::Push]);
        assert!(n.validate().is_err());

        let n = Notification::new("u1", "event", NotificationPriority::Low, "t", "m")
            .with_channels([ChannelKind::Push, ChannelKind::Email]);
        assert!(n.validate().is_ok());
    }

    #[test]
    fn test_metadata_preserves_extra_fields() {
        let json = serde_json::json!({
            "batch_eligible": true,
            "retry_count": 2,
            "source": "forum-digest"
        });
        let meta: NotificationMetadata = serde_json::from_value(json).unwrap();
        assert!(meta.batch_eligible);
        assert_eq!(meta.retry_count, 2);
        assert_eq!(meta.extra["source"], "forum-digest");

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["source"], "forum-digest");
        assert!(back.get("batch_id").is_none());
    }

    #[test]
    fn test_channel_kind_parse() {
        assert_eq!("in_app".parse::<ChannelKind>().unwrap(), ChannelKind::InApp);
        assert_eq!(ChannelKind::Email.to_string(), "email");
    }
}
