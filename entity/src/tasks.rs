use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub use crate::TaskStatus;

/// A task observed on the origin chain and relayed for execution.
/// `result_hash` is only set once the task is completed, `pending_result` keeps a
/// result that was produced but could not be written back to the origin chain.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "relay_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub origin_task_id: String,
    pub settlement_task_id: Option<String>,
    pub external_compute_id: Option<String>,
    pub service_id: String,
    pub requester_address: String,
    pub amount: String,
    pub event_timestamp: i64,
    pub status: TaskStatus,
    pub result_hash: Option<String>,
    pub pending_result: Option<String>,
    pub error_msg: Option<String>,
    pub fallback_attempted: bool,
    pub create_at: i64,
    pub update_at: i64,
    pub complete_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
