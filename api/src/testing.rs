//! In-memory fakes for the injected collaborators, used by handler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tempo_core::model::{Category, Plan, ScheduleBlock, Task, UserPreference};

use crate::config::Config;
use crate::oracle::{Oracle, OracleError};
use crate::push::{PushError, PushMessage, PushSender};
use crate::queue::{DelayedTask, QueueError, TaskQueue};
use crate::state::AppState;
use crate::store::{NewScheduleBlock, Store, StoreError};

pub fn test_state(
    store: Arc<FakeStore>,
    oracle: Arc<FakeOracle>,
    queue: Arc<FakeQueue>,
    push: Arc<FakePush>,
) -> AppState {
    AppState {
        store,
        oracle,
        queue,
        push,
        config: Arc::new(test_config()),
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        gemini_api_key: "test-key".to_string(),
        gemini_model: "gemini-test".to_string(),
        queue_url: "https://queue.test/tasks".to_string(),
        public_url: "https://tempo.test".to_string(),
        fcm_endpoint: "https://fcm.test/send".to_string(),
        fcm_server_key: "test-fcm-key".to_string(),
        port: 0,
    }
}

#[derive(Default)]
pub struct FakeStore {
    sessions: Mutex<HashMap<String, Uuid>>,
    plans: Mutex<HashMap<Uuid, Plan>>,
    tasks: Mutex<Vec<Task>>,
    preferences: Mutex<HashMap<Uuid, UserPreference>>,
    seeded_blocks: Mutex<Vec<ScheduleBlock>>,
    inserted: Mutex<Vec<ScheduleBlock>>,
    categories: Mutex<Vec<Category>>,
    snapshot_reads: AtomicUsize,
    insert_failure: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(user_id: Uuid, title: &str) -> Task {
        Task {
            id: Uuid::now_v7(),
            user_id,
            category_id: None,
            title: title.to_string(),
            importance: 3,
            est_minutes: 60,
            done: false,
            due_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn add_session(&self, token_hash: &str, user_id: Uuid) {
        self.sessions
            .lock()
            .unwrap()
            .insert(token_hash.to_string(), user_id);
    }

    pub fn add_user(&self, user_id: Uuid, plan: Plan) {
        self.plans.lock().unwrap().insert(user_id, plan);
    }

    pub fn add_task(&self, user_id: Uuid, title: &str) -> Uuid {
        let task = Self::task(user_id, title);
        let id = task.id;
        self.tasks.lock().unwrap().push(task);
        id
    }

    pub fn push_task(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }

    pub fn set_device_token(&self, user_id: Uuid, token: &str) {
        self.preferences.lock().unwrap().insert(
            user_id,
            UserPreference {
                device_token: Some(token.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn add_category(&self, user_id: Uuid, name: &str) -> Uuid {
        let category = Category {
            id: Uuid::now_v7(),
            user_id,
            name: name.to_string(),
            color_hex: "#3366ff".to_string(),
        };
        let id = category.id;
        self.categories.lock().unwrap().push(category);
        id
    }

    pub fn add_block(&self, user_id: Uuid, task_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.seeded_blocks.lock().unwrap().push(ScheduleBlock {
            id: Uuid::now_v7(),
            user_id,
            task_id,
            start,
            end,
            auto: false,
            created_at: Utc::now(),
        });
    }

    pub fn fail_inserts(&self) {
        self.insert_failure.store(true, Ordering::SeqCst);
    }

    pub fn snapshot_read_count(&self) -> usize {
        self.snapshot_reads.load(Ordering::SeqCst)
    }

    pub fn inserted_blocks(&self) -> Vec<ScheduleBlock> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn inserted_block_count(&self) -> usize {
        self.inserted.lock().unwrap().len()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn session_user(&self, token_hash: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(token_hash).copied())
    }

    async fn user_plan(&self, user_id: Uuid) -> Result<Option<Plan>, StoreError> {
        Ok(self.plans.lock().unwrap().get(&user_id).copied())
    }

    async fn open_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError> {
        self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id && !t.done)
            .cloned()
            .collect())
    }

    async fn all_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn preference(&self, user_id: Uuid) -> Result<Option<UserPreference>, StoreError> {
        self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.preferences.lock().unwrap().get(&user_id).cloned())
    }

    async fn upcoming_blocks(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>, StoreError> {
        self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .seeded_blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.user_id == user_id && b.start >= from)
            .cloned()
            .collect())
    }

    async fn blocks_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>, StoreError> {
        let seeded = self.seeded_blocks.lock().unwrap();
        let inserted = self.inserted.lock().unwrap();
        Ok(seeded
            .iter()
            .chain(inserted.iter())
            .filter(|b| b.user_id == user_id && b.start >= from && b.start <= until)
            .cloned()
            .collect())
    }

    async fn categories(&self, user_id: Uuid) -> Result<Vec<Category>, StoreError> {
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_blocks(
        &self,
        user_id: Uuid,
        blocks: &[NewScheduleBlock],
    ) -> Result<Vec<ScheduleBlock>, StoreError> {
        if self.insert_failure.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let created: Vec<ScheduleBlock> = blocks
            .iter()
            .map(|b| ScheduleBlock {
                id: Uuid::now_v7(),
                user_id,
                task_id: b.task_id,
                start: b.start,
                end: b.end,
                auto: true,
                created_at: Utc::now(),
            })
            .collect();

        // All-or-nothing, matching the transactional contract.
        self.inserted.lock().unwrap().extend(created.clone());
        Ok(created)
    }
}

pub struct FakeOracle {
    response: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeOracle {
    pub fn with_response(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_error(err: OracleError) -> Self {
        Self {
            response: Err(err.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for FakeOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(OracleError::Http(message.clone())),
        }
    }
}

#[derive(Default)]
pub struct FakeQueue {
    tasks: Mutex<Vec<DelayedTask>>,
    attempts: AtomicUsize,
    fail_first: bool,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose first enqueue attempt fails; the rest succeed.
    pub fn failing_first() -> Self {
        Self {
            fail_first: true,
            ..Default::default()
        }
    }

    pub fn enqueued(&self) -> Vec<DelayedTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskQueue for FakeQueue {
    async fn enqueue(&self, task: DelayedTask) -> Result<(), QueueError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && attempt == 0 {
            return Err(QueueError::Http("simulated enqueue failure".to_string()));
        }
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePush {
    sent: Mutex<Vec<PushMessage>>,
    fail: bool,
}

impl FakePush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for FakePush {
    async fn send(&self, message: PushMessage) -> Result<String, PushError> {
        if self.fail {
            return Err(PushError::Rejected("simulated dispatch failure".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok("fake-message-id".to_string())
    }
}
