//! Repository layer for notification persistence.

pub mod memory;
pub mod notification;

pub use memory::MemoryNotificationRepository;
pub use notification::{NotificationRepository, SqlxNotificationRepository};
