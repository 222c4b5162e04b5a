mod db_ops;
mod mem;

pub use db_ops::DbOpsImpl;
pub use mem::InMemoryTaskStore;

use crate::chain::TaskCreated;
use async_trait::async_trait;
use chrono::Utc;
pub use entity::tasks::Model as Task;
pub use entity::TaskStatus;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(String),
    #[error("task {0} already exists")]
    Duplicate(String),
    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

/// Fields known when a task is first seen on the origin chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTask {
    pub origin_task_id: String,
    pub service_id: String,
    pub requester_address: String,
    pub amount: String,
    pub event_timestamp: i64,
}

impl From<&TaskCreated> for NewTask {
    fn from(event: &TaskCreated) -> Self {
        NewTask {
            origin_task_id: event.origin_task_id.clone(),
            service_id: event.service_id.clone(),
            requester_address: event.requester_address.clone(),
            amount: event.amount.to_string(),
            event_timestamp: event.timestamp,
        }
    }
}

impl NewTask {
    fn into_task(self) -> Task {
        let now = Utc::now().timestamp();
        Task {
            origin_task_id: self.origin_task_id,
            settlement_task_id: None,
            external_compute_id: None,
            service_id: self.service_id,
            requester_address: self.requester_address,
            amount: self.amount,
            event_timestamp: self.event_timestamp,
            status: TaskStatus::Created,
            result_hash: None,
            pending_result: None,
            error_msg: None,
            fallback_attempted: false,
            create_at: now,
            update_at: now,
            complete_at: None,
        }
    }
}

/// Persisted relay tasks. Every status change is checked against the
/// forward-only transition rules of [`TaskStatus`] atomically with the write.
#[async_trait]
pub trait TaskRepo {
    async fn find_by_origin_id(&self, origin_task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Insert a task in `Created` state, fails with `Duplicate` if the id is known
    async fn save(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn update_status(&self, origin_task_id: &str, status: TaskStatus) -> Result<(), StoreError>;

    /// `Processing -> Completed`, stamps `complete_at`
    async fn update_result(&self, origin_task_id: &str, result_hash: &str) -> Result<(), StoreError>;

    /// `Created | Processing -> Failed`
    async fn update_error(&self, origin_task_id: &str, message: &str) -> Result<(), StoreError>;

    async fn set_settlement_task_id(
        &self,
        origin_task_id: &str,
        settlement_task_id: &str,
    ) -> Result<(), StoreError>;

    async fn set_external_compute_id(
        &self,
        origin_task_id: &str,
        external_compute_id: &str,
    ) -> Result<(), StoreError>;

    /// The result is known but could not be written back, the task fails and the
    /// result is parked in `pending_result`
    async fn record_write_back_failure(
        &self,
        origin_task_id: &str,
        result: &str,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Set the fallback flag, returns false if it was already set
    async fn claim_fallback(&self, origin_task_id: &str) -> Result<bool, StoreError>;

    async fn list_task(&self, status: Option<Vec<TaskStatus>>) -> Result<Vec<Task>, StoreError>;

    async fn get_task(&self, origin_task_id: &str) -> Result<Task, StoreError> {
        self.find_by_origin_id(origin_task_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(origin_task_id.to_string()))
    }
}
