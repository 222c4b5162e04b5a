use super::{NewTask, StoreError, Task, TaskRepo};
use async_trait::async_trait;
use chrono::Utc;
use entity::tasks as Tasks;
use entity::TaskStatus;
use log::{debug, info};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, UpdateMany};

/// [`TaskRepo`] on a sea-orm connection, every mutation is a single conditional UPDATE
pub struct DbOpsImpl {
    conn: DatabaseConnection,
}

impl DbOpsImpl {
    pub fn new(conn: DatabaseConnection) -> Self {
        DbOpsImpl { conn }
    }

    /// Run `update` against one task. When `to` is given the row must currently be in
    /// one of its predecessor states, otherwise nothing is written.
    async fn apply(
        &self,
        origin_task_id: &str,
        to: Option<TaskStatus>,
        update: UpdateMany<Tasks::Entity>,
    ) -> Result<(), StoreError> {
        let mut update = update
            .col_expr(Tasks::Column::UpdateAt, Expr::value(Utc::now().timestamp()))
            .filter(Tasks::Column::OriginTaskId.eq(origin_task_id));

        if let Some(to) = to {
            let allowed = to.predecessors();
            if allowed.is_empty() {
                return Err(self.rejected(origin_task_id, to).await);
            }
            update = update
                .col_expr(Tasks::Column::Status, Expr::value(to))
                .filter(Tasks::Column::Status.is_in(allowed));
        }

        let res = update.exec(&self.conn).await?;
        if res.rows_affected > 0 {
            return Ok(());
        }
        match to {
            Some(to) => Err(self.rejected(origin_task_id, to).await),
            None => match self.find_by_origin_id(origin_task_id).await? {
                Some(_) => Ok(()),
                None => Err(StoreError::NotFound(origin_task_id.to_string())),
            },
        }
    }

    /// Explain why a transition into `to` matched no row
    async fn rejected(&self, origin_task_id: &str, to: TaskStatus) -> StoreError {
        match self.find_by_origin_id(origin_task_id).await {
            Ok(Some(task)) => StoreError::InvalidTransition {
                id: origin_task_id.to_string(),
                from: task.status,
                to,
            },
            Ok(None) => StoreError::NotFound(origin_task_id.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl TaskRepo for DbOpsImpl {
    async fn find_by_origin_id(&self, origin_task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(Tasks::Entity::find_by_id(origin_task_id.to_string())
            .one(&self.conn)
            .await?)
    }

    async fn save(&self, task: NewTask) -> Result<Task, StoreError> {
        if self.find_by_origin_id(&task.origin_task_id).await?.is_some() {
            return Err(StoreError::Duplicate(task.origin_task_id));
        }

        let model = task.into_task();
        let active: Tasks::ActiveModel = model.clone().into();
        if let Err(e) = Tasks::Entity::insert(active)
            .exec_without_returning(&self.conn)
            .await
        {
            // lost a race against a concurrent insert of the same id
            if self.find_by_origin_id(&model.origin_task_id).await?.is_some() {
                return Err(StoreError::Duplicate(model.origin_task_id));
            }
            return Err(e.into());
        }
        info!("task {} recorded as {}", model.origin_task_id, model.status);
        Ok(model)
    }

    async fn update_status(&self, origin_task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        self.apply(origin_task_id, Some(status), Tasks::Entity::update_many())
            .await?;
        debug!("task {} moved to {}", origin_task_id, status);
        Ok(())
    }

    async fn update_result(&self, origin_task_id: &str, result_hash: &str) -> Result<(), StoreError> {
        let update = Tasks::Entity::update_many()
            .col_expr(Tasks::Column::ResultHash, Expr::value(result_hash.to_string()))
            .col_expr(Tasks::Column::PendingResult, Expr::value(Option::<String>::None))
            .col_expr(Tasks::Column::ErrorMsg, Expr::value(Option::<String>::None))
            .col_expr(Tasks::Column::CompleteAt, Expr::value(Utc::now().timestamp()));
        self.apply(origin_task_id, Some(TaskStatus::Completed), update)
            .await
    }

    async fn update_error(&self, origin_task_id: &str, message: &str) -> Result<(), StoreError> {
        let update = Tasks::Entity::update_many()
            .col_expr(Tasks::Column::ErrorMsg, Expr::value(message.to_string()))
            .col_expr(Tasks::Column::CompleteAt, Expr::value(Utc::now().timestamp()));
        self.apply(origin_task_id, Some(TaskStatus::Failed), update)
            .await
    }

    async fn set_settlement_task_id(
        &self,
        origin_task_id: &str,
        settlement_task_id: &str,
    ) -> Result<(), StoreError> {
        let update = Tasks::Entity::update_many().col_expr(
            Tasks::Column::SettlementTaskId,
            Expr::value(settlement_task_id.to_string()),
        );
        self.apply(origin_task_id, None, update).await
    }

    async fn set_external_compute_id(
        &self,
        origin_task_id: &str,
        external_compute_id: &str,
    ) -> Result<(), StoreError> {
        let update = Tasks::Entity::update_many().col_expr(
            Tasks::Column::ExternalComputeId,
            Expr::value(external_compute_id.to_string()),
        );
        self.apply(origin_task_id, None, update).await
    }

    async fn record_write_back_failure(
        &self,
        origin_task_id: &str,
        result: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let update = Tasks::Entity::update_many()
            .col_expr(Tasks::Column::PendingResult, Expr::value(result.to_string()))
            .col_expr(Tasks::Column::ErrorMsg, Expr::value(message.to_string()))
            .col_expr(Tasks::Column::CompleteAt, Expr::value(Utc::now().timestamp()));
        self.apply(origin_task_id, Some(TaskStatus::Failed), update)
            .await
    }

    async fn claim_fallback(&self, origin_task_id: &str) -> Result<bool, StoreError> {
        let res = Tasks::Entity::update_many()
            .col_expr(Tasks::Column::FallbackAttempted, Expr::value(true))
            .col_expr(Tasks::Column::UpdateAt, Expr::value(Utc::now().timestamp()))
            .filter(Tasks::Column::OriginTaskId.eq(origin_task_id))
            .filter(Tasks::Column::FallbackAttempted.eq(false))
            .exec(&self.conn)
            .await?;
        if res.rows_affected > 0 {
            return Ok(true);
        }
        match self.find_by_origin_id(origin_task_id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(origin_task_id.to_string())),
        }
    }

    async fn list_task(&self, status: Option<Vec<TaskStatus>>) -> Result<Vec<Task>, StoreError> {
        let mut query = Tasks::Entity::find();
        if let Some(status) = status {
            query = query.filter(Tasks::Column::Status.is_in(status));
        }
        Ok(query
            .order_by_desc(Tasks::Column::CreateAt)
            .all(&self.conn)
            .await?)
    }
}
