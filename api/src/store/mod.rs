use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tempo_core::model::{Category, Plan, ScheduleBlock, Task, UserPreference};

mod pg;
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A block to persist, produced by the schedule validator. The store assigns
/// the id and `created_at`; `auto` is always true for these.
#[derive(Debug, Clone)]
pub struct NewScheduleBlock {
    pub task_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Storage seam for every read and write the handlers perform.
///
/// Every operation is scoped to a single user id, so cross-user reads are
/// impossible by construction. Injected into `AppState` as a trait object so
/// tests can substitute an in-memory fake.
#[async_trait]
pub trait Store: Send + Sync {
    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Resolve a session token hash to the owning user id.
    async fn session_user(&self, token_hash: &str) -> Result<Option<Uuid>, StoreError>;

    /// The user's subscription plan, if a user row exists.
    async fn user_plan(&self, user_id: Uuid) -> Result<Option<Plan>, StoreError>;

    /// All not-done tasks owned by the user.
    async fn open_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError>;

    /// All tasks owned by the user, done or not (analytics).
    async fn all_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError>;

    /// The user's singleton preference row. A missing row is not an error.
    async fn preference(&self, user_id: Uuid) -> Result<Option<UserPreference>, StoreError>;

    /// Schedule blocks starting at or after `from`.
    async fn upcoming_blocks(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>, StoreError>;

    /// Schedule blocks starting within `[from, until]` (analytics).
    async fn blocks_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>, StoreError>;

    /// The user's categories (analytics).
    async fn categories(&self, user_id: Uuid) -> Result<Vec<Category>, StoreError>;

    /// Insert all blocks atomically with `auto = true`: either every block is
    /// persisted or none are.
    async fn insert_blocks(
        &self,
        user_id: Uuid,
        blocks: &[NewScheduleBlock],
    ) -> Result<Vec<ScheduleBlock>, StoreError>;
}
