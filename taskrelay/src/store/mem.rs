use super::{NewTask, StoreError, Task, TaskRepo};
use async_trait::async_trait;
use chrono::Utc;
use entity::TaskStatus;
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Process local [`TaskRepo`], everything is lost on restart
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl std::fmt::Debug for InMemoryTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTaskStore").finish()
    }
}

impl InMemoryTaskStore {
    /// Mutate one task under the write lock, checking the transition into `to` first
    fn modify<F>(&self, origin_task_id: &str, to: Option<TaskStatus>, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let mut guard = self.tasks.write();
        let task = guard
            .get_mut(origin_task_id)
            .ok_or_else(|| StoreError::NotFound(origin_task_id.to_string()))?;
        if let Some(to) = to {
            if !task.status.can_transition_to(to) {
                return Err(StoreError::InvalidTransition {
                    id: origin_task_id.to_string(),
                    from: task.status,
                    to,
                });
            }
            task.status = to;
        }
        f(task);
        task.update_at = Utc::now().timestamp();
        Ok(())
    }
}

#[async_trait]
impl TaskRepo for InMemoryTaskStore {
    async fn find_by_origin_id(&self, origin_task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().get(origin_task_id).cloned())
    }

    async fn save(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut guard = self.tasks.write();
        if guard.contains_key(&task.origin_task_id) {
            return Err(StoreError::Duplicate(task.origin_task_id));
        }
        let model = task.into_task();
        guard.insert(model.origin_task_id.clone(), model.clone());
        info!("task {} recorded as {}", model.origin_task_id, model.status);
        Ok(model)
    }

    async fn update_status(&self, origin_task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        self.modify(origin_task_id, Some(status), |_| {})
    }

    async fn update_result(&self, origin_task_id: &str, result_hash: &str) -> Result<(), StoreError> {
        self.modify(origin_task_id, Some(TaskStatus::Completed), |task| {
            task.result_hash = Some(result_hash.to_string());
            task.pending_result = None;
            task.error_msg = None;
            task.complete_at = Some(Utc::now().timestamp());
        })
    }

    async fn update_error(&self, origin_task_id: &str, message: &str) -> Result<(), StoreError> {
        self.modify(origin_task_id, Some(TaskStatus::Failed), |task| {
            task.error_msg = Some(message.to_string());
            task.complete_at = Some(Utc::now().timestamp());
        })
    }

    async fn set_settlement_task_id(
        &self,
        origin_task_id: &str,
        settlement_task_id: &str,
    ) -> Result<(), StoreError> {
        self.modify(origin_task_id, None, |task| {
            task.settlement_task_id = Some(settlement_task_id.to_string())
        })
    }

    async fn set_external_compute_id(
        &self,
        origin_task_id: &str,
        external_compute_id: &str,
    ) -> Result<(), StoreError> {
        self.modify(origin_task_id, None, |task| {
            task.external_compute_id = Some(external_compute_id.to_string())
        })
    }

    async fn record_write_back_failure(
        &self,
        origin_task_id: &str,
        result: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        self.modify(origin_task_id, Some(TaskStatus::Failed), |task| {
            task.pending_result = Some(result.to_string());
            task.error_msg = Some(message.to_string());
            task.complete_at = Some(Utc::now().timestamp());
        })
    }

    async fn claim_fallback(&self, origin_task_id: &str) -> Result<bool, StoreError> {
        let mut claimed = false;
        self.modify(origin_task_id, None, |task| {
            claimed = !task.fallback_attempted;
            task.fallback_attempted = true;
        })?;
        Ok(claimed)
    }

    async fn list_task(&self, status: Option<Vec<TaskStatus>>) -> Result<Vec<Task>, StoreError> {
        let guard = self.tasks.read();
        let mut tasks: Vec<Task> = guard
            .values()
            .filter(|task| status.as_ref().map_or(true, |s| s.contains(&task.status)))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.create_at.cmp(&a.create_at));
        Ok(tasks)
    }
}
