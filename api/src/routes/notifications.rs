use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tempo_core::error::ApiError;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::push::PushMessage;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/notifications/test", post(test_notification))
}

/// Callback routes invoked by the delayed-task queue, not by end users.
pub fn internal_router() -> Router<AppState> {
    Router::new().route("/internal/reminders/deliver", post(deliver_reminder))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TestNotificationRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSentResponse {
    pub success: bool,
    pub message_id: String,
}

/// Send a test push notification to a specific device token.
#[utoipa::path(
    post,
    path = "/v1/notifications/test",
    request_body = TestNotificationRequest,
    responses(
        (status = 200, description = "Notification dispatched", body = NotificationSentResponse),
        (status = 400, description = "Missing token", body = ApiError),
        (status = 401, description = "Missing or invalid credentials", body = ApiError),
        (status = 500, description = "Dispatch failure", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn test_notification(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<TestNotificationRequest>,
) -> Result<Json<NotificationSentResponse>, AppError> {
    let token = req.token.filter(|t| !t.is_empty()).ok_or_else(|| {
        AppError::Validation {
            message: "token is required".to_string(),
            field: Some("token".to_string()),
            received: None,
            docs_hint: Some("Pass the device token registered in user preferences.".to_string()),
        }
    })?;

    tracing::info!(user_id = %auth.user_id, "sending test notification");
    let message_id = state
        .push
        .send(PushMessage {
            token,
            title: "Hello from Tempo!".to_string(),
            body: "This is a test notification from your backend.".to_string(),
        })
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "test notification dispatch failed");
            AppError::Internal("Failed to send notification".to_string())
        })?;

    Ok(Json(NotificationSentResponse {
        success: true,
        message_id,
    }))
}

/// Payload the smart-schedule flow enqueues for each reminder; delivered back
/// here by the queue at the reminder fire time.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub task_id: Uuid,
    pub task_title: String,
    pub user_id: Uuid,
    pub device_token: String,
}

/// Reminder delivery callback. A non-200 response makes the queue redeliver
/// later (at-least-once semantics).
#[utoipa::path(
    post,
    path = "/internal/reminders/deliver",
    request_body = ReminderPayload,
    responses(
        (status = 200, description = "Reminder pushed", body = NotificationSentResponse),
        (status = 500, description = "Dispatch failure, queue will retry", body = ApiError)
    ),
    tag = "notifications"
)]
pub async fn deliver_reminder(
    State(state): State<AppState>,
    Json(payload): Json<ReminderPayload>,
) -> Result<Json<NotificationSentResponse>, AppError> {
    let message_id = state
        .push
        .send(PushMessage {
            token: payload.device_token,
            title: "Upcoming task".to_string(),
            body: format!("\"{}\" starts in 10 minutes", payload.task_title),
        })
        .await
        .map_err(|err| {
            tracing::error!(
                task_id = %payload.task_id,
                user_id = %payload.user_id,
                error = %err,
                "reminder dispatch failed"
            );
            AppError::Internal("Failed to deliver reminder".to_string())
        })?;

    tracing::info!(task_id = %payload.task_id, user_id = %payload.user_id, "reminder delivered");
    Ok(Json(NotificationSentResponse {
        success: true,
        message_id,
    }))
}
