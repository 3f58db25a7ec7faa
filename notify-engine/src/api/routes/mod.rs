//! API route modules.

pub mod health;
pub mod notifications;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/health", health::router())
        .nest("/api/notifications", notifications::router())
        .with_state(state)
}
