//! In-app notification channel.
//!
//! The persisted notification row already appears in the user's list on the
//! next read, so there is nothing to send.

use async_trait::async_trait;

use super::NotificationChannel;
use crate::Result;
use crate::notification::models::{ChannelKind, Notification};

#[derive(Debug, Clone, Copy, Default)]
pub struct InAppChannel;

#[async_trait]
impl NotificationChannel for InAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn send(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}
