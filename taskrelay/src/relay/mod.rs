//! Moves tasks from the origin chain to an executor and the result back again.

mod cursor;
mod error;
mod orchestrator;
mod submitter;
mod watcher;

pub use cursor::EventCursor;
pub use error::{SubmitError, WatchError};
pub use orchestrator::{Admission, TaskOrchestrator};
pub use submitter::{derive_result, max_fee_per_gas, CrossChainSubmitter, ResultWriter};
pub use watcher::{ChainEventWatcher, TickReport};

use crate::chain::TaskCreated;

/// Identity of a task as carried to the executor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayRequest {
    pub origin_task_id: String,
    pub service_id: String,
    pub requester_address: String,
}

impl RelayRequest {
    pub fn new(origin_task_id: &str, service_id: &str, requester_address: &str) -> Self {
        RelayRequest {
            origin_task_id: origin_task_id.to_string(),
            service_id: service_id.to_string(),
            requester_address: requester_address.to_string(),
        }
    }

    /// Transaction data and simulated job parameters
    pub fn payload(&self) -> String {
        format!(
            "Task:{},Service:{},User:{}",
            self.origin_task_id, self.service_id, self.requester_address
        )
    }
}

impl From<&TaskCreated> for RelayRequest {
    fn from(event: &TaskCreated) -> Self {
        RelayRequest::new(
            &event.origin_task_id,
            &event.service_id,
            &event.requester_address,
        )
    }
}
