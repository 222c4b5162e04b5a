use super::{CrossChainSubmitter, RelayRequest, ResultWriter, SubmitError};
use crate::chain::TaskCreated;
use crate::simulate::{SimulatedComputeEngine, SimulatedStatus};
use crate::store::{NewTask, StoreError, TaskRepo, TaskStatus};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What happened to a task creation fact
#[derive(Debug)]
pub enum Admission {
    /// The origin task id is already known, nothing was done
    Duplicate,
    /// Recorded and moved to `Processing`, the handle tracks its pipeline
    Accepted(JoinHandle<()>),
}

/// Owns the task state machine: admits new tasks and drives each one through the
/// settlement chain or the simulator to a terminal state
pub struct TaskOrchestrator {
    store: Arc<dyn TaskRepo + Send + Sync>,
    submitter: Option<Arc<CrossChainSubmitter>>,
    simulator: Arc<SimulatedComputeEngine>,
    writer: Arc<ResultWriter>,
}

impl TaskOrchestrator {
    /// `submitter` is `None` when the settlement path is disabled
    pub fn new(
        store: Arc<dyn TaskRepo + Send + Sync>,
        submitter: Option<Arc<CrossChainSubmitter>>,
        simulator: Arc<SimulatedComputeEngine>,
        writer: Arc<ResultWriter>,
    ) -> Self {
        TaskOrchestrator {
            store,
            submitter,
            simulator,
            writer,
        }
    }

    pub async fn on_task_created(
        self: &Arc<Self>,
        event: &TaskCreated,
    ) -> Result<Admission, StoreError> {
        let id = event.origin_task_id.as_str();
        match self.store.find_by_origin_id(id).await? {
            Some(existing) if existing.status == TaskStatus::Created => {
                info!("task {} was recorded but never started, resuming", id);
            }
            Some(existing) => {
                self.report_duplicate(&existing, event);
                return Ok(Admission::Duplicate);
            }
            None => match self.store.save(NewTask::from(event)).await {
                Ok(_) => {}
                Err(StoreError::Duplicate(_)) => {
                    info!("task {} was recorded concurrently, skipping", id);
                    return Ok(Admission::Duplicate);
                }
                Err(e) => return Err(e),
            },
        }
        match self.store.update_status(id, TaskStatus::Processing).await {
            Ok(()) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                info!("task {} was started concurrently ({}), skipping", id, from);
                return Ok(Admission::Duplicate);
            }
            Err(e) => return Err(e),
        }
        info!(
            "task {} (service {}, requester {}) is processing",
            id, event.service_id, event.requester_address
        );

        Ok(Admission::Accepted(self.spawn_pipeline(RelayRequest::from(event))))
    }

    /// Fail every task left open by a previous run. Its pipeline is gone and
    /// settlement is never resubmitted automatically, so it cannot finish on its own.
    pub async fn fail_interrupted(&self) -> Result<usize, StoreError> {
        let open = self
            .store
            .list_task(Some(vec![TaskStatus::Created, TaskStatus::Processing]))
            .await?;
        for task in &open {
            warn!(
                "task {} was {} when the relay stopped, marking it failed",
                task.origin_task_id, task.status
            );
            fail_open_task(
                self.store.as_ref(),
                &task.origin_task_id,
                "interrupted by relay restart",
            )
            .await;
        }
        Ok(open.len())
    }

    fn report_duplicate(&self, existing: &crate::store::Task, event: &TaskCreated) {
        let same = existing.service_id == event.service_id
            && existing.requester_address == event.requester_address
            && existing.amount == event.amount.to_string()
            && existing.event_timestamp == event.timestamp;
        if same {
            info!("task {} already exists, skipping", existing.origin_task_id);
        } else {
            warn!(
                "task {} re-emitted with different data, dropped. known: service {} requester {} amount {} ts {}, new: service {} requester {} amount {} ts {}",
                existing.origin_task_id,
                existing.service_id,
                existing.requester_address,
                existing.amount,
                existing.event_timestamp,
                event.service_id,
                event.requester_address,
                event.amount,
                event.timestamp
            );
        }
    }

    /// Run the pipeline on its own task; a panic inside it fails only this task
    fn spawn_pipeline(self: &Arc<Self>, req: RelayRequest) -> JoinHandle<()> {
        let this = self.clone();
        let id = req.origin_task_id.clone();
        let pipeline = tokio::spawn(async move { this.process(req).await });

        let store = self.store.clone();
        tokio::spawn(async move {
            match pipeline.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    let panic = e.into_panic();
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("pipeline of task {} panicked: {}", id, msg);
                    fail_open_task(store.as_ref(), &id, &format!("pipeline panicked: {}", msg)).await;
                }
                Err(e) => warn!("pipeline of task {} cancelled: {}", id, e),
            }
        })
    }

    async fn process(&self, req: RelayRequest) {
        let id = req.origin_task_id.clone();
        if let Err(e) = self.drive(&req).await {
            error!("task {} failed: {}", id, e);
            fail_open_task(self.store.as_ref(), &id, &e.to_string()).await;
        }
    }

    async fn drive(&self, req: &RelayRequest) -> Result<(), SubmitError> {
        let id = req.origin_task_id.as_str();
        match &self.submitter {
            Some(submitter) => match submitter.relay(req).await {
                Ok(_) => return Ok(()),
                Err(e) if e.allows_fallback() => {
                    warn!("task {}: {}, falling back to simulated compute", id, e)
                }
                Err(e) => return Err(e),
            },
            None => info!("settlement disabled, task {} goes to simulated compute", id),
        }
        self.simulate(req).await
    }

    /// Simulated execution, attempted at most once per task across all callers
    async fn simulate(&self, req: &RelayRequest) -> Result<(), SubmitError> {
        let id = req.origin_task_id.as_str();
        if !self.store.claim_fallback(id).await? {
            warn!("simulated compute already attempted for task {}, not retrying", id);
            return Ok(());
        }

        let sim_id = self.simulator.submit(&req.requester_address, &req.payload());
        self.store.set_external_compute_id(id, &sim_id).await?;

        let mut interval = tokio::time::interval(self.simulator.config().poll_interval);
        loop {
            interval.tick().await;
            let snapshot = self.simulator.poll_status(&sim_id)?;
            match (snapshot.status, snapshot.result) {
                (SimulatedStatus::Completed, Some(result)) => {
                    return self.writer.complete(id, &result).await;
                }
                (SimulatedStatus::Completed, None) | (SimulatedStatus::Failed, _) => {
                    let msg = format!("simulated compute {} failed", sim_id);
                    self.store.update_error(id, &msg).await?;
                    info!("task {}: {}", id, msg);
                    return Ok(());
                }
                (status, _) => debug!("task {} simulated compute {} is {}", id, sim_id, status),
            }
        }
    }
}

/// Mark a task failed unless it already reached a terminal state
async fn fail_open_task(store: &(dyn TaskRepo + Send + Sync), id: &str, msg: &str) {
    match store.update_error(id, msg).await {
        Ok(()) => {}
        Err(StoreError::InvalidTransition { from, .. }) => {
            debug!("task {} already {}, keeping it", id, from)
        }
        Err(e) => error!("failed to record failure of task {}: {}", id, e),
    }
}
