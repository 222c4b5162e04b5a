use num_enum::{IntoPrimitive, TryFromPrimitive};
use sea_orm::entity::prelude::*;
use serde_repr::*;

use std::fmt;

/// Lifecycle state of a relayed task, the inner type is i32
/// 1 Created    the origin chain emitted the task and it has been recorded
/// 2 Processing the task has been handed to the settlement chain or the simulator
/// 3 Completed  a result was produced and written back
/// 4 Failed     the task will not be retried automatically
#[repr(i32)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize_repr,
    Deserialize_repr,
    EnumIter,
    DeriveActiveEnum,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum TaskStatus {
    #[sea_orm(num_value = 1)]
    Created = 1,
    #[sea_orm(num_value = 2)]
    Processing = 2,
    #[sea_orm(num_value = 3)]
    Completed = 3,
    #[sea_orm(num_value = 4)]
    Failed = 4,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// States a task may be in right before entering `self`.
    /// Status only moves forward, terminal states accept nothing.
    pub fn predecessors(&self) -> Vec<TaskStatus> {
        match self {
            TaskStatus::Created => vec![],
            TaskStatus::Processing => vec![TaskStatus::Created],
            TaskStatus::Completed => vec![TaskStatus::Processing],
            TaskStatus::Failed => vec![TaskStatus::Created, TaskStatus::Processing],
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TaskStatus::Created => "Created",
            TaskStatus::Processing => "Processing",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}
