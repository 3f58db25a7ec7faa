//! Operator HTTP surface.
//!
//! Health, queue statistics, notification lookup and ingestion.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, AppState};
