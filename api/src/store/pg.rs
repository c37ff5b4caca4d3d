use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tempo_core::model::{Category, Plan, ScheduleBlock, Task, UserPreference};

use super::{NewScheduleBlock, Store, StoreError};

/// Postgres-backed store. Holds the connection pool; all handler queries go
/// through here.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn session_user(&self, token_hash: &str) -> Result<Option<Uuid>, StoreError> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }

    async fn user_plan(&self, user_id: Uuid) -> Result<Option<Plan>, StoreError> {
        let plan = sqlx::query_scalar::<_, String>("SELECT plan FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan.map(|p| {
            if p == "premium" {
                Plan::Premium
            } else {
                Plan::Free
            }
        }))
    }

    async fn open_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, user_id, category_id, title, importance, est_minutes, done, due_date, created_at
            FROM tasks
            WHERE user_id = $1 AND done = FALSE
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    async fn all_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, user_id, category_id, title, importance, est_minutes, done, due_date, created_at
            FROM tasks
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    async fn preference(&self, user_id: Uuid) -> Result<Option<UserPreference>, StoreError> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT efficiency_peak, default_transport, compact_schedule, device_token
            FROM user_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PreferenceRow::into_preference))
    }

    async fn upcoming_blocks(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>, StoreError> {
        let rows = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT id, user_id, task_id, start_at, end_at, auto, created_at
            FROM schedule_blocks
            WHERE user_id = $1 AND start_at >= $2
            ORDER BY start_at
            "#,
        )
        .bind(user_id)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BlockRow::into_block).collect())
    }

    async fn blocks_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>, StoreError> {
        let rows = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT id, user_id, task_id, start_at, end_at, auto, created_at
            FROM schedule_blocks
            WHERE user_id = $1 AND start_at >= $2 AND start_at <= $3
            ORDER BY start_at
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BlockRow::into_block).collect())
    }

    async fn categories(&self, user_id: Uuid) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, user_id, name, color_hex FROM categories WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CategoryRow::into_category).collect())
    }

    async fn insert_blocks(
        &self,
        user_id: Uuid,
        blocks: &[NewScheduleBlock],
    ) -> Result<Vec<ScheduleBlock>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(blocks.len());

        for block in blocks {
            let row = sqlx::query_as::<_, BlockRow>(
                r#"
                INSERT INTO schedule_blocks (id, user_id, task_id, start_at, end_at, auto)
                VALUES ($1, $2, $3, $4, $5, TRUE)
                RETURNING id, user_id, task_id, start_at, end_at, auto, created_at
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(user_id)
            .bind(block.task_id)
            .bind(block.start)
            .bind(block.end)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row.into_block());
        }

        tx.commit().await?;
        Ok(created)
    }
}

/// Internal row types for sqlx mapping

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    user_id: Uuid,
    category_id: Option<Uuid>,
    title: String,
    importance: i32,
    est_minutes: i32,
    done: bool,
    due_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Task {
        Task {
            id: self.id,
            user_id: self.user_id,
            category_id: self.category_id,
            title: self.title,
            importance: self.importance,
            est_minutes: self.est_minutes,
            done: self.done,
            due_date: self.due_date,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    efficiency_peak: Option<String>,
    default_transport: Option<String>,
    compact_schedule: Option<bool>,
    device_token: Option<String>,
}

impl PreferenceRow {
    fn into_preference(self) -> UserPreference {
        UserPreference {
            efficiency_peak: self.efficiency_peak,
            default_transport: self.default_transport,
            compact_schedule: self.compact_schedule,
            device_token: self.device_token,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BlockRow {
    id: Uuid,
    user_id: Uuid,
    task_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    auto: bool,
    created_at: DateTime<Utc>,
}

impl BlockRow {
    fn into_block(self) -> ScheduleBlock {
        ScheduleBlock {
            id: self.id,
            user_id: self.user_id,
            task_id: self.task_id,
            start: self.start_at,
            end: self.end_at,
            auto: self.auto,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    color_hex: String,
}

impl CategoryRow {
    fn into_category(self) -> Category {
        Category {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            color_hex: self.color_hex,
        }
    }
}
