//! Notification delivery engine.
//!
//! Routes decided notifications into a throttled immediate lane or
//! per-user batch queues, delivers them across push, email and in-app
//! channels, and retries failed deliveries.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;

pub use error::{Error, Result};
