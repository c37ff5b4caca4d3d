use std::collections::HashSet;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tempo_core::error::ApiError;
use tempo_core::model::{ScheduleBlock, Task, UserPreference};

use crate::auth::{require_premium, AuthenticatedUser};
use crate::error::AppError;
use crate::queue::DelayedTask;
use crate::state::AppState;
use crate::store::{NewScheduleBlock, Store, StoreError};

/// Fixed lead time: reminders fire this many minutes before a block starts.
const REMINDER_LEAD_MINUTES: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/schedule/smart", post(smart_schedule))
}

/// Request body for smart scheduling. The `tasks` array is only checked for
/// presence — the authoritative task set is re-fetched from storage, so a
/// caller cannot schedule tasks it does not own. `userPref` and
/// `existingBlocks` are accepted and recomputed for the same reason.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SmartScheduleRequest {
    #[serde(default)]
    pub tasks: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    pub user_pref: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    pub existing_blocks: Option<serde_json::Value>,
}

/// The validator's output echoed back verbatim: each entry is the oracle's
/// original object, extra fields included.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SmartScheduleResponse {
    pub schedule: Vec<serde_json::Value>,
}

/// The authoritative per-request read of the caller's state, fetched fresh
/// from storage — never cached across requests.
struct Snapshot {
    tasks: Vec<Task>,
    preference: UserPreference,
    blocks: Vec<ScheduleBlock>,
}

/// Three independent reads, executed concurrently; the first failure wins.
async fn fetch_snapshot(
    store: &dyn Store,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Snapshot, StoreError> {
    let (tasks, preference, blocks) = tokio::try_join!(
        store.open_tasks(user_id),
        store.preference(user_id),
        store.upcoming_blocks(user_id, now),
    )?;

    Ok(Snapshot {
        tasks,
        preference: preference.unwrap_or_default(),
        blocks,
    })
}

fn build_schedule_prompt(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    let tasks = serde_json::to_string(&snapshot.tasks)?;
    let preference = serde_json::to_string(&snapshot.preference)?;
    let blocks = serde_json::to_string(&snapshot.blocks)?;

    Ok(format!(
        "As a scheduling expert, analyze the following tasks, user preferences, \
         and existing schedule blocks. Generate an optimal schedule in JSON format.\n\
         Tasks: {tasks}\n\
         User Preferences: {preference}\n\
         Existing Blocks: {blocks}\n\
         Return a JSON array of schedule blocks, where each block has \"taskId\", \
         \"start\" (ISO 8601), and \"end\" (ISO 8601).\n\
         Ensure that the \"taskId\" in the generated schedule blocks matches one of \
         the provided task IDs."
    ))
}

/// Decode the oracle's free-text response as a JSON array. The response is
/// untrusted input: JSON-ness is an assumption, not a contract.
fn parse_oracle_schedule(text: &str) -> Result<Vec<serde_json::Value>, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("response is not valid JSON: {e}"))?;
    match value {
        serde_json::Value::Array(entries) => Ok(entries),
        other => Err(format!(
            "expected a JSON array of schedule blocks, got {}",
            match other {
                serde_json::Value::Object(_) => "an object",
                serde_json::Value::String(_) => "a string",
                _ => "a non-array value",
            }
        )),
    }
}

/// An oracle-proposed entry that survived validation: its task id names one of
/// the caller's open tasks and its timestamps parsed. `raw` is the original
/// entry, echoed back to the caller untouched.
#[derive(Debug, Clone)]
struct ValidatedBlock {
    task_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    raw: serde_json::Value,
}

/// Filter oracle output down to entries referencing real task ids. Offending
/// entries are dropped with a warning; one bad entry never fails the request.
/// Order is preserved and duplicates are kept; no time-ordering or overlap
/// checks happen here.
fn validate_suggestion(
    proposed: &[serde_json::Value],
    task_ids: &HashSet<Uuid>,
) -> Vec<ValidatedBlock> {
    proposed
        .iter()
        .filter_map(|entry| {
            let task_id = entry
                .get("taskId")
                .and_then(serde_json::Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok());
            let Some(task_id) = task_id else {
                tracing::warn!(entry = %entry, "suggested block has no usable taskId, skipping");
                return None;
            };

            if !task_ids.contains(&task_id) {
                tracing::warn!(task_id = %task_id, "invalid taskId in suggested block, skipping");
                return None;
            }

            let Some(start) = parse_timestamp(entry, "start") else {
                tracing::warn!(task_id = %task_id, "suggested block has unparseable start, skipping");
                return None;
            };
            let Some(end) = parse_timestamp(entry, "end") else {
                tracing::warn!(task_id = %task_id, "suggested block has unparseable end, skipping");
                return None;
            };

            Some(ValidatedBlock {
                task_id,
                start,
                end,
                raw: entry.clone(),
            })
        })
        .collect()
}

fn parse_timestamp(entry: &serde_json::Value, field: &str) -> Option<DateTime<Utc>> {
    entry
        .get(field)
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// For each persisted block: compute the reminder fire time, skip past-due
/// reminders and token-less users, and enqueue a delayed callback. Each
/// failure is caught and logged — one broken reminder must never prevent the
/// others from being scheduled, and already-persisted blocks are never rolled
/// back from here.
async fn schedule_reminders(state: &AppState, user_id: Uuid, blocks: &[ValidatedBlock], tasks: &[Task]) {
    for block in blocks {
        // Should always resolve given the validator's filter.
        let Some(task) = tasks.iter().find(|t| t.id == block.task_id) else {
            continue;
        };

        let reminder_time = block.start - Duration::minutes(REMINDER_LEAD_MINUTES);
        if reminder_time <= Utc::now() {
            tracing::info!(
                task = %task.title,
                "reminder time is in the past, skipping enqueue"
            );
            continue;
        }

        // Fresh preference read per block, not reused from the snapshot: the
        // device token may have changed since the request started.
        let device_token = match state.store.preference(user_id).await {
            Ok(pref) => pref.and_then(|p| p.device_token),
            Err(err) => {
                tracing::error!(task = %task.title, error = %err, "preference read failed for reminder");
                continue;
            }
        };
        let Some(device_token) = device_token else {
            tracing::warn!(
                user_id = %user_id,
                task = %task.title,
                "no device token on file, skipping reminder"
            );
            continue;
        };

        let payload = serde_json::json!({
            "taskId": task.id,
            "taskTitle": task.title,
            "userId": user_id,
            "deviceToken": device_token,
        });

        let delayed = DelayedTask {
            url: state.config.reminder_url(),
            payload,
            schedule_time: reminder_time,
        };

        match state.queue.enqueue(delayed).await {
            Ok(()) => {
                tracing::info!(task = %task.title, at = %reminder_time, "reminder enqueued");
            }
            Err(err) => {
                tracing::error!(task = %task.title, error = %err, "failed to enqueue reminder");
            }
        }
    }
}

/// Smart scheduling: have the model place the caller's open tasks into time
/// slots, persist the result, and schedule reminders.
///
/// Premium-only. The pipeline is fail-fast up to and including persistence
/// (no partial writes), then best-effort for reminder scheduling.
#[utoipa::path(
    post,
    path = "/v1/schedule/smart",
    request_body = SmartScheduleRequest,
    responses(
        (status = 200, description = "Validated schedule suggestion, already persisted", body = SmartScheduleResponse),
        (status = 400, description = "Empty or malformed tasks array", body = ApiError),
        (status = 401, description = "Missing or invalid credentials", body = ApiError),
        (status = 403, description = "Caller is not on the premium plan", body = ApiError),
        (status = 500, description = "Store, model, or parse failure", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "schedule"
)]
pub async fn smart_schedule(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<SmartScheduleRequest>,
) -> Result<Json<SmartScheduleResponse>, AppError> {
    let user_id = auth.user_id;

    require_premium(state.store.as_ref(), user_id).await?;

    let client_task_count = req
        .tasks
        .as_ref()
        .and_then(serde_json::Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    if client_task_count == 0 {
        return Err(AppError::Validation {
            message: "tasks must be a non-empty array".to_string(),
            field: Some("tasks".to_string()),
            received: req.tasks,
            docs_hint: Some(
                "Send the open tasks you want scheduled; the server re-reads the \
                 authoritative set from storage."
                    .to_string(),
            ),
        });
    }

    tracing::info!(user_id = %user_id, task_count = client_task_count, "smart scheduling request");

    let now = Utc::now();
    let snapshot = fetch_snapshot(state.store.as_ref(), user_id, now).await?;

    let prompt = build_schedule_prompt(&snapshot)
        .map_err(|e| AppError::Internal(format!("failed to serialize snapshot: {e}")))?;

    let response_text = state.oracle.complete(&prompt).await.map_err(|err| {
        tracing::error!(user_id = %user_id, error = %err, "oracle call failed");
        AppError::Internal("Failed to generate schedule".to_string())
    })?;

    let proposed = parse_oracle_schedule(&response_text).map_err(|err| {
        tracing::error!(user_id = %user_id, error = %err, "oracle response unusable");
        AppError::Internal("Failed to generate schedule".to_string())
    })?;

    let task_ids: HashSet<Uuid> = snapshot.tasks.iter().map(|t| t.id).collect();
    let validated = validate_suggestion(&proposed, &task_ids);

    let new_blocks: Vec<NewScheduleBlock> = validated
        .iter()
        .map(|b| NewScheduleBlock {
            task_id: b.task_id,
            start: b.start,
            end: b.end,
        })
        .collect();
    state.store.insert_blocks(user_id, &new_blocks).await?;

    schedule_reminders(&state, user_id, &validated, &snapshot.tasks).await;

    Ok(Json(SmartScheduleResponse {
        schedule: validated.into_iter().map(|b| b.raw).collect(),
    }))
}
