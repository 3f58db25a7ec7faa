//! Notification routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::notification::models::{
    ChannelKind, Notification, NotificationBatch, NotificationPriority,
};
use crate::notification::{EnqueueRoute, QueueStats};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_notification))
        .route("/queue/stats", get(queue_stats))
        .route("/batches/{id}", get(get_batch))
        .route("/{id}", get(get_notification))
}

// DTOs

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    pub category: String,
    #[serde(default)]
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub channels: Option<Vec<ChannelKind>>,
    #[serde(default)]
    pub batch_eligible: bool,
}

impl CreateNotificationRequest {
    fn into_notification(self) -> Notification {
        let mut notification = Notification::new(
            self.user_id,
            self.category,
            self.priority,
            self.title,
            self.message,
        )
        .batch_eligible(self.batch_eligible);

        if let Some(id) = self.id {
            notification = notification.with_id(id);
        }
        if let Some(channels) = self.channels {
            notification = notification.with_channels(channels);
        }
        if let Some(data) = self.data {
            notification = notification.with_data(data);
        }
        notification
    }
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: String,
    pub route: EnqueueRoute,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    #[serde(flatten)]
    pub batch: NotificationBatch,
    pub notifications: Vec<Notification>,
}

// Handlers

/// Persist a notification and hand it to the queue.
async fn create_notification(
    State(state): State<AppState>,
    Json(request): Json<CreateNotificationRequest>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let notification = request.into_notification();
    notification.validate()?;

    state.repository.insert_notification(&notification).await?;

    let id = notification.id.clone();
    let route = state.manager.enqueue_notification(notification)?;

    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { id, route })))
}

async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.manager.queue_stats())
}

async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let notification = state.repository.get_notification(&id).await?;
    Ok(Json(notification))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BatchResponse>> {
    let batch = state.repository.get_notification_batch(&id).await?;
    let notifications = state.repository.list_batch_notifications(&id).await?;
    Ok(Json(BatchResponse {
        batch,
        notifications,
    }))
}
