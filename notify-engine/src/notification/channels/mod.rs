//! Delivery adapters.
//!
//! One adapter per channel kind:
//! - Push (push-gateway transport)
//! - Email (email relay transport)
//! - In-app (no external call, always succeeds)
//!
//! [`DeliveryAdapters`] is the boundary where transport errors stop: every
//! send is turned into a [`DeliveryResult`].

mod email;
mod in_app;
mod push;
mod relay;

pub use email::{EmailChannel, EmailMessage, EmailTransport};
pub use in_app::InAppChannel;
pub use push::{PushChannel, PushMessage, PushTransport};
pub use relay::{HttpRelayConfig, HttpRelayTransport};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::models::{ChannelKind, DeliveryResult, Notification};
use crate::Result;

/// Trait for delivery channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// The channel kind this adapter serves.
    fn kind(&self) -> ChannelKind;

    /// Send a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Registry of delivery adapters keyed by channel kind.
#[derive(Clone)]
pub struct DeliveryAdapters {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
}

impl Default for DeliveryAdapters {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryAdapters {
    /// Registry with the in-app adapter installed.
    pub fn new() -> Self {
        Self::empty().with_channel(Arc::new(InAppChannel))
    }

    /// Registry with no adapters at all.
    pub fn empty() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Install an adapter, replacing any previous one for the same kind.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register(channel);
        self
    }

    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        let kind = channel.kind();
        if self.channels.insert(kind, channel).is_some() {
            debug!("Replaced delivery adapter for {}", kind);
        }
    }

    /// Registered channel kinds, sorted.
    pub fn kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<ChannelKind> = self.channels.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Deliver through one channel. Never fails; errors become results.
    pub async fn deliver(&self, kind: ChannelKind, notification: &Notification) -> DeliveryResult {
        let Some(channel) = self.channels.get(&kind) else {
            warn!(
                notification_id = %notification.id,
                channel = %kind,
                "No delivery adapter configured"
            );
            return DeliveryResult::failed(kind, "channel not configured");
        };

        match channel.send(notification).await {
            Ok(()) => {
                debug!(notification_id = %notification.id, channel = %kind, "Delivered");
                DeliveryResult::delivered(kind)
            }
            Err(e) => {
                debug!(
                    notification_id = %notification.id,
                    channel = %kind,
                    error = %e,
                    "Delivery attempt failed"
                );
                DeliveryResult::failed(kind, e.to_string())
            }
        }
    }

    /// Fan out to every channel the notification requests, concurrently.
    ///
    /// Results come back in the order of `notification.channels`.
    pub async fn deliver_all(&self, notification: &Notification) -> Vec<DeliveryResult> {
        join_all(
            notification
                .channels
                .iter()
                .map(|kind| self.deliver(*kind, notification)),
        )
        .await
    }
}
