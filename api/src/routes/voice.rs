use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use tempo_core::error::ApiError;
use tempo_core::model::TaskDraft;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/voice/parse", post(parse_voice))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParseVoiceRequest {
    #[serde(default)]
    pub voice_text: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParseVoiceResponse {
    pub task_draft: TaskDraft,
}

fn build_voice_prompt(voice_text: &str) -> String {
    format!(
        "As a task management assistant, parse the following voice input into a \
         JSON object representing a task draft.\n\
         Extract the task title, estimated minutes (estMinutes), importance (1-5, \
         5 being most important), and an optional dueDate (ISO 8601 format).\n\
         If a category is mentioned, try to identify it. If no specific value is \
         found for a field, omit it from the JSON.\n\
         Voice Input: \"{voice_text}\"\n\
         Example Output:\n\
         {{\n\
           \"title\": \"Buy groceries\",\n\
           \"estMinutes\": 60,\n\
           \"importance\": 4,\n\
           \"dueDate\": \"2025-07-20T18:00:00Z\",\n\
           \"categoryName\": \"Shopping\"\n\
         }}\n\
         Return only the JSON object."
    )
}

/// The oracle's reply is untrusted text: decode permissively, then shape into
/// a typed draft. Unknown fields are ignored; only the title is required.
fn parse_task_draft(text: &str) -> Result<TaskDraft, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("response is not valid JSON: {e}"))?;
    serde_json::from_value(value).map_err(|e| format!("response is not a task draft: {e}"))
}

/// Parse free-text voice input into a structured task draft via the model.
/// Nothing is persisted — the draft goes back to the client for confirmation.
#[utoipa::path(
    post,
    path = "/v1/voice/parse",
    request_body = ParseVoiceRequest,
    responses(
        (status = 200, description = "Extracted task draft", body = ParseVoiceResponse),
        (status = 400, description = "Empty voice text", body = ApiError),
        (status = 401, description = "Missing or invalid credentials", body = ApiError),
        (status = 500, description = "Model call or parse failure", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "voice"
)]
pub async fn parse_voice(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<ParseVoiceRequest>,
) -> Result<Json<ParseVoiceResponse>, AppError> {
    let voice_text = req
        .voice_text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation {
            message: "voiceText must be a non-empty string".to_string(),
            field: Some("voiceText".to_string()),
            received: req.voice_text.clone().map(serde_json::Value::String),
            docs_hint: None,
        })?;

    let prompt = build_voice_prompt(voice_text);
    let response_text = state.oracle.complete(&prompt).await.map_err(|err| {
        tracing::error!(user_id = %auth.user_id, error = %err, "voice parse oracle call failed");
        AppError::Internal("Failed to parse voice text into task draft".to_string())
    })?;

    let task_draft = parse_task_draft(&response_text).map_err(|err| {
        tracing::error!(user_id = %auth.user_id, error = %err, "voice parse response unusable");
        AppError::Internal("Failed to parse voice text into task draft".to_string())
    })?;

    tracing::info!(user_id = %auth.user_id, title = %task_draft.title, "parsed voice text");
    Ok(Json(ParseVoiceResponse { task_draft }))
}
