use std::collections::{HashMap, HashSet};

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tempo_core::error::ApiError;
use tempo_core::model::{Category, ScheduleBlock, Task};

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/analytics/weekly", get(weekly_analytics))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct WeeklyAnalyticsParams {
    /// Window start (RFC 3339), required
    #[serde(default)]
    pub start: Option<String>,
    /// Window end (RFC 3339), required
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CategoryCompletion {
    pub completed: u32,
    pub total: u32,
}

/// Tasks bucketed by importance and urgency.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EisenhowerMatrix {
    /// Important and urgent
    #[serde(rename = "do")]
    pub do_now: Vec<Task>,
    /// Important, not urgent
    pub decide: Vec<Task>,
    /// Not important, urgent
    pub delegate: Vec<Task>,
    /// Neither
    pub delete: Vec<Task>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAnalyticsResponse {
    /// Percent of the user's tasks marked done (0 when there are none)
    pub completion_rate: f64,
    pub category_completion: HashMap<Uuid, CategoryCompletion>,
    /// Scheduled minutes per category, summed over block durations
    pub category_time_spent: HashMap<Uuid, f64>,
    pub eisenhower_matrix: EisenhowerMatrix,
}

fn parse_window_bound(
    value: Option<String>,
    field: &str,
) -> Result<DateTime<Utc>, AppError> {
    let raw = value.ok_or_else(|| AppError::Validation {
        message: format!("{field} is required"),
        field: Some(field.to_string()),
        received: None,
        docs_hint: Some("Pass an RFC 3339 timestamp, e.g. 2025-08-18T00:00:00Z".to_string()),
    })?;

    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AppError::Validation {
            message: format!("{field} is not a valid RFC 3339 timestamp"),
            field: Some(field.to_string()),
            received: Some(serde_json::Value::String(raw)),
            docs_hint: None,
        })
}

/// Importance 3+ counts as important; a due date within the next two days
/// (or already past) counts as urgent.
fn bucket_tasks(tasks: &[Task], now: DateTime<Utc>) -> EisenhowerMatrix {
    let urgency_horizon = now + Duration::days(2);
    let mut matrix = EisenhowerMatrix {
        do_now: Vec::new(),
        decide: Vec::new(),
        delegate: Vec::new(),
        delete: Vec::new(),
    };

    for task in tasks {
        let important = task.importance >= 3;
        let urgent = task
            .due_date
            .map(|due| due <= urgency_horizon)
            .unwrap_or(false);

        let bucket = match (important, urgent) {
            (true, true) => &mut matrix.do_now,
            (true, false) => &mut matrix.decide,
            (false, true) => &mut matrix.delegate,
            (false, false) => &mut matrix.delete,
        };
        bucket.push(task.clone());
    }

    matrix
}

fn compute_analytics(
    tasks: Vec<Task>,
    blocks: Vec<ScheduleBlock>,
    categories: Vec<Category>,
    now: DateTime<Utc>,
) -> WeeklyAnalyticsResponse {
    let known_categories: HashSet<Uuid> = categories.iter().map(|c| c.id).collect();

    let total = tasks.len() as f64;
    let completed = tasks.iter().filter(|t| t.done).count() as f64;
    let completion_rate = if total > 0.0 {
        completed / total * 100.0
    } else {
        0.0
    };

    let mut category_completion: HashMap<Uuid, CategoryCompletion> = HashMap::new();
    for task in &tasks {
        let Some(category_id) = task.category_id.filter(|id| known_categories.contains(id))
        else {
            continue;
        };
        let entry = category_completion
            .entry(category_id)
            .or_insert(CategoryCompletion {
                completed: 0,
                total: 0,
            });
        entry.total += 1;
        if task.done {
            entry.completed += 1;
        }
    }

    let mut category_time_spent: HashMap<Uuid, f64> = HashMap::new();
    for block in &blocks {
        let category_id = tasks
            .iter()
            .find(|t| t.id == block.task_id)
            .and_then(|t| t.category_id)
            .filter(|id| known_categories.contains(id));
        let Some(category_id) = category_id else {
            continue;
        };
        let minutes = (block.end - block.start).num_seconds() as f64 / 60.0;
        *category_time_spent.entry(category_id).or_insert(0.0) += minutes;
    }

    WeeklyAnalyticsResponse {
        completion_rate,
        category_completion,
        category_time_spent,
        eisenhower_matrix: bucket_tasks(&tasks, now),
    }
}

/// Weekly analytics: completion rate, per-category effort, and an Eisenhower
/// bucketing of the caller's tasks. Plain aggregation over the caller's own
/// rows; premium is not required.
#[utoipa::path(
    get,
    path = "/v1/analytics/weekly",
    params(WeeklyAnalyticsParams),
    responses(
        (status = 200, description = "Aggregated weekly report", body = WeeklyAnalyticsResponse),
        (status = 400, description = "Missing or malformed window bounds", body = ApiError),
        (status = 401, description = "Missing or invalid credentials", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn weekly_analytics(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<WeeklyAnalyticsParams>,
) -> Result<Json<WeeklyAnalyticsResponse>, AppError> {
    let user_id = auth.user_id;
    let start = parse_window_bound(params.start, "start")?;
    let end = parse_window_bound(params.end, "end")?;

    let (tasks, blocks, categories) = tokio::try_join!(
        state.store.all_tasks(user_id),
        state.store.blocks_between(user_id, start, end),
        state.store.categories(user_id),
    )?;

    Ok(Json(compute_analytics(tasks, blocks, categories, Utc::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, FakeOracle, FakePush, FakeQueue, FakeStore};
    use std::sync::Arc;
    use tempo_core::model::Plan;

    fn task_with(
        user_id: Uuid,
        category_id: Option<Uuid>,
        importance: i32,
        due_in_hours: Option<i64>,
        done: bool,
    ) -> Task {
        let mut task = FakeStore::task(user_id, "task");
        task.category_id = category_id;
        task.importance = importance;
        task.due_date = due_in_hours.map(|h| Utc::now() + Duration::hours(h));
        task.done = done;
        task
    }

    #[test]
    fn bucketing_covers_all_four_quadrants() {
        let user_id = Uuid::now_v7();
        let now = Utc::now();
        let tasks = vec![
            task_with(user_id, None, 5, Some(12), false),  // do
            task_with(user_id, None, 4, Some(24 * 7), false), // decide
            task_with(user_id, None, 1, Some(-2), false),  // delegate (overdue)
            task_with(user_id, None, 2, None, false),      // delete
        ];

        let matrix = bucket_tasks(&tasks, now);
        assert_eq!(matrix.do_now.len(), 1);
        assert_eq!(matrix.decide.len(), 1);
        assert_eq!(matrix.delegate.len(), 1);
        assert_eq!(matrix.delete.len(), 1);
    }

    #[test]
    fn completion_rate_is_zero_without_tasks() {
        let report = compute_analytics(vec![], vec![], vec![], Utc::now());
        assert_eq!(report.completion_rate, 0.0);
        assert!(report.category_completion.is_empty());
    }

    #[test]
    fn time_spent_sums_block_durations_per_category() {
        let user_id = Uuid::now_v7();
        let category = Category {
            id: Uuid::now_v7(),
            user_id,
            name: "Deep work".to_string(),
            color_hex: "#3366ff".to_string(),
        };
        let task = task_with(user_id, Some(category.id), 3, None, true);
        let start = Utc::now();
        let blocks = vec![
            ScheduleBlock {
                id: Uuid::now_v7(),
                user_id,
                task_id: task.id,
                start,
                end: start + Duration::minutes(45),
                auto: true,
                created_at: start,
            },
            ScheduleBlock {
                id: Uuid::now_v7(),
                user_id,
                task_id: task.id,
                start: start + Duration::hours(2),
                end: start + Duration::hours(2) + Duration::minutes(30),
                auto: false,
                created_at: start,
            },
        ];

        let report = compute_analytics(vec![task], blocks, vec![category.clone()], Utc::now());
        assert_eq!(report.category_time_spent[&category.id], 75.0);
        assert_eq!(report.completion_rate, 100.0);
        assert_eq!(report.category_completion[&category.id].completed, 1);
    }

    #[tokio::test]
    async fn handler_requires_both_window_bounds() {
        let store = Arc::new(FakeStore::new());
        let user_id = Uuid::now_v7();
        store.add_user(user_id, Plan::Free);
        let state = test_state(
            store,
            Arc::new(FakeOracle::with_response("[]")),
            Arc::new(FakeQueue::new()),
            Arc::new(FakePush::new()),
        );

        let result = weekly_analytics(
            State(state),
            AuthenticatedUser { user_id },
            Query(WeeklyAnalyticsParams {
                start: Some(Utc::now().to_rfc3339()),
                end: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn handler_aggregates_only_the_callers_rows() {
        let store = Arc::new(FakeStore::new());
        let user_id = Uuid::now_v7();
        let stranger = Uuid::now_v7();
        store.add_user(user_id, Plan::Free);

        let category = store.add_category(user_id, "Deep work");
        let mut done_task = FakeStore::task(user_id, "done");
        done_task.category_id = Some(category);
        done_task.done = true;
        let task_id = done_task.id;
        store.push_task(done_task);
        store.push_task(FakeStore::task(stranger, "not mine"));

        let start = Utc::now();
        store.add_block(user_id, task_id, start + Duration::hours(1), start + Duration::hours(2));

        let state = test_state(
            store,
            Arc::new(FakeOracle::with_response("[]")),
            Arc::new(FakeQueue::new()),
            Arc::new(FakePush::new()),
        );

        let report = weekly_analytics(
            State(state),
            AuthenticatedUser { user_id },
            Query(WeeklyAnalyticsParams {
                start: Some(start.to_rfc3339()),
                end: Some((start + Duration::days(7)).to_rfc3339()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(report.0.completion_rate, 100.0);
        assert_eq!(report.0.category_time_spent[&category], 60.0);
    }
}
