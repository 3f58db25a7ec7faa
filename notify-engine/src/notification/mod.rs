//! Notification delivery engine.
//!
//! Turns individually decided notifications into rate-limited, optionally
//! batched deliveries across push, email and in-app channels.
//!
//! # Components
//!
//! - [`NotificationQueueManager`] routes incoming notifications and owns
//!   the background work
//! - [`BatchAggregator`] coalesces low-urgency notifications per user and
//!   category
//! - [`ThrottledDispatcher`] drains the immediate lane at a fixed rate
//! - [`DeliveryAdapters`] fans a notification out across its channels
//! - [`RetryPolicy`] decides what happens after a failed attempt

pub mod batch;
pub mod channels;
pub mod dispatcher;
pub mod events;
pub mod models;
pub mod retry;
pub mod service;
pub mod throttle;

pub use batch::{BatchAggregator, BatchKey};
pub use channels::{
    DeliveryAdapters, EmailChannel, EmailTransport, HttpRelayConfig, HttpRelayTransport,
    InAppChannel, NotificationChannel, PushChannel, PushTransport,
};
pub use dispatcher::{ImmediateLane, ThrottledDispatcher};
pub use events::QueueEvent;
pub use models::{
    ChannelKind, DeliveryResult, Notification, NotificationBatch, NotificationMetadata,
    NotificationPriority, NotificationStatus,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use service::{EnqueueRoute, NotificationQueueManager, QueueStats};
pub use throttle::Throttle;
