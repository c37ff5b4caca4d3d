use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Subscription plan. The smart-schedule endpoint is premium-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Premium,
}

/// A user task. Created and edited by the task UI; the scheduling core only
/// ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    pub title: String,
    /// Importance 1-5, 5 being most important
    pub importance: i32,
    /// Estimated duration in minutes
    pub est_minutes: i32,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-user singleton preference record. The scheduling core reads only
/// `device_token`; the rest is serialized into the oracle prompt verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficiency_peak: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact_schedule: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
}

/// A placed block on the calendar. Inserted either by the user directly or by
/// the smart-schedule flow (`auto = true`); never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub auto: bool,
    pub created_at: DateTime<Utc>,
}

/// A task category, used for analytics grouping and calendar coloring.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color_hex: String,
}

/// A task draft extracted from free-text voice input by the model.
/// Everything except the title is optional — the model omits fields it
/// cannot find a value for.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}
