//! In-process stand-in for an external compute network.
//!
//! A simulated job has no real work behind it: its state is derived from the time
//! elapsed since submission. Once the deadline passes the outcome is drawn once and
//! stored, after which every read observes the same terminal state.

use crate::config::SimulatorConfig;
use dashmap::DashMap;
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Length of the opening and closing phases of a simulated job
const PHASE_WINDOW: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulatedStatus {
    Active,
    Running,
    Revealing,
    Completed,
    Failed,
}

impl SimulatedStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SimulatedStatus::Completed | SimulatedStatus::Failed)
    }
}

impl fmt::Display for SimulatedStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("simulated task {0} not found")]
    NotFound(String),
}

#[derive(Clone, Debug)]
struct Outcome {
    success: bool,
    result: Option<String>,
    resolved_at: Instant,
}

#[derive(Clone, Debug)]
struct SimulatedTask {
    requester: String,
    params: String,
    created: Instant,
    deadline: Instant,
    outcome: Option<Outcome>,
}

impl SimulatedTask {
    fn phase(&self, now: Instant) -> SimulatedStatus {
        match &self.outcome {
            Some(o) if o.success => SimulatedStatus::Completed,
            Some(_) => SimulatedStatus::Failed,
            None if now.duration_since(self.created) < PHASE_WINDOW => SimulatedStatus::Active,
            None if self.deadline.saturating_duration_since(now) <= PHASE_WINDOW => {
                SimulatedStatus::Revealing
            }
            None => SimulatedStatus::Running,
        }
    }
}

/// What callers see of a simulated job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedSnapshot {
    pub id: String,
    pub requester: String,
    pub params: String,
    pub status: SimulatedStatus,
    pub result: Option<String>,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
}

pub struct SimulatedComputeEngine {
    tasks: DashMap<String, SimulatedTask>,
    cfg: SimulatorConfig,
}

impl SimulatedComputeEngine {
    pub fn new(cfg: SimulatorConfig) -> Self {
        SimulatedComputeEngine {
            tasks: DashMap::new(),
            cfg,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.cfg
    }

    /// Start a simulated job with a random duration in `[min_duration, max_duration)`
    pub fn submit(&self, requester: &str, params: &str) -> String {
        let mut rng = rand::thread_rng();
        let min = self.cfg.min_duration.as_millis() as u64;
        let max = self.cfg.max_duration.as_millis() as u64;
        let duration = Duration::from_millis(if min < max { rng.gen_range(min..max) } else { min });
        let id = format!("0x{}{}", Uuid::new_v4().to_simple(), Uuid::new_v4().to_simple());

        let now = Instant::now();
        self.tasks.insert(
            id.clone(),
            SimulatedTask {
                requester: requester.to_string(),
                params: params.to_string(),
                created: now,
                deadline: now + duration,
                outcome: None,
            },
        );
        info!(
            "simulated task {} submitted for {}, finishes in {}",
            id,
            requester,
            humantime::format_duration(duration)
        );
        id
    }

    /// Current state of a job, resolving it if its deadline has passed
    pub fn poll_status(&self, id: &str) -> Result<SimulatedSnapshot, SimulationError> {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SimulationError::NotFound(id.to_string()))?;
        let now = Instant::now();
        if entry.outcome.is_none() && now >= entry.deadline {
            let success = rand::thread_rng().gen_bool(self.cfg.success_ratio);
            entry.outcome = Some(self.outcome(success, now));
            info!(
                "simulated task {} resolved as {}",
                id,
                entry.phase(now)
            );
        }
        Ok(snapshot(id, &entry, now))
    }

    /// Set the terminal outcome right away. The entry lock orders this against a
    /// concurrent resolution, the later writer wins and the job stays terminal.
    pub fn force_complete(&self, id: &str, success: bool) -> Result<SimulatedSnapshot, SimulationError> {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SimulationError::NotFound(id.to_string()))?;
        let now = Instant::now();
        entry.outcome = Some(self.outcome(success, now));
        info!("simulated task {} forced to {}", id, entry.phase(now));
        Ok(snapshot(id, &entry, now))
    }

    pub fn list(&self) -> Vec<SimulatedSnapshot> {
        let ids: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        let mut snapshots: Vec<SimulatedSnapshot> = ids
            .iter()
            .filter_map(|id| self.poll_status(id).ok())
            .collect();
        snapshots.sort_by(|a, b| a.elapsed_secs.cmp(&b.elapsed_secs));
        snapshots
    }

    /// Drop terminal jobs resolved longer than the retention window ago, pending jobs stay
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let retention = self.cfg.retention;
        let before = self.tasks.len();
        self.tasks.retain(|_, task| match &task.outcome {
            Some(o) => now.duration_since(o.resolved_at) < retention,
            None => true,
        });
        before.saturating_sub(self.tasks.len())
    }

    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.cfg.sweep_interval);
            loop {
                interval.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    info!("purged {} expired simulated tasks", purged);
                } else {
                    debug!("simulated task sweep found nothing to purge");
                }
            }
        })
    }

    fn outcome(&self, success: bool, now: Instant) -> Outcome {
        let result = if success {
            let mut rng = rand::thread_rng();
            Some(format!("Qm{}", ethers::utils::hex::encode(rng.gen::<[u8; 22]>())))
        } else {
            None
        };
        Outcome {
            success,
            result,
            resolved_at: now,
        }
    }
}

fn snapshot(id: &str, task: &SimulatedTask, now: Instant) -> SimulatedSnapshot {
    SimulatedSnapshot {
        id: id.to_string(),
        requester: task.requester.clone(),
        params: task.params.clone(),
        status: task.phase(now),
        result: task.outcome.as_ref().and_then(|o| o.result.clone()),
        elapsed_secs: now.duration_since(task.created).as_secs(),
        remaining_secs: task.deadline.saturating_duration_since(now).as_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn engine(success_ratio: f64) -> SimulatedComputeEngine {
        SimulatedComputeEngine::new(SimulatorConfig {
            success_ratio,
            ..SimulatorConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn walks_through_phases_then_resolves() {
        let engine = engine(1.0);
        let id = engine.submit("0xabc", "Task:1");
        assert!(id.starts_with("0x"));
        assert_eq!(id.len(), 66);
        assert_eq!(engine.poll_status(&id).unwrap().status, SimulatedStatus::Active);

        advance(Duration::from_secs(11)).await;
        let snap = engine.poll_status(&id).unwrap();
        // shortest job is 30s so 11s in is past the opening window and before the closing one
        assert_eq!(snap.status, SimulatedStatus::Running);
        assert!(snap.result.is_none());

        advance(Duration::from_secs(120)).await;
        let snap = engine.poll_status(&id).unwrap();
        assert_eq!(snap.status, SimulatedStatus::Completed);
        let result = snap.result.unwrap();
        assert!(result.starts_with("Qm"));
        assert_eq!(result.len(), 46);
    }

    #[tokio::test(start_paused = true)]
    async fn revealing_precedes_deadline() {
        let engine = SimulatedComputeEngine::new(SimulatorConfig {
            min_duration: Duration::from_secs(60),
            max_duration: Duration::from_millis(60_001),
            ..SimulatorConfig::default()
        });
        let id = engine.submit("0xabc", "");
        advance(Duration::from_secs(55)).await;
        assert_eq!(
            engine.poll_status(&id).unwrap().status,
            SimulatedStatus::Revealing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_state_is_stable() {
        let engine = engine(0.5);
        let id = engine.submit("0xabc", "");
        advance(Duration::from_secs(121)).await;

        let first = engine.poll_status(&id).unwrap();
        assert!(first.status.is_terminal());
        for _ in 0..20 {
            advance(Duration::from_secs(1)).await;
            let again = engine.poll_status(&id).unwrap();
            assert_eq!(again.status, first.status);
            assert_eq!(again.result, first.result);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_has_no_result() {
        let engine = engine(0.0);
        let id = engine.submit("0xabc", "");
        advance(Duration::from_secs(121)).await;
        let snap = engine.poll_status(&id).unwrap();
        assert_eq!(snap.status, SimulatedStatus::Failed);
        assert!(snap.result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn force_complete_overrides_pending_job() {
        let engine = engine(0.0);
        let id = engine.submit("0xabc", "");
        let snap = engine.force_complete(&id, true).unwrap();
        assert_eq!(snap.status, SimulatedStatus::Completed);
        assert!(snap.result.is_some());

        // past the deadline the forced outcome is kept, no second draw happens
        advance(Duration::from_secs(200)).await;
        assert_eq!(engine.poll_status(&id).unwrap(), {
            let mut s = snap.clone();
            s.elapsed_secs = 200;
            s.remaining_secs = 0;
            s
        });

        let snap = engine.force_complete(&id, false).unwrap();
        assert_eq!(snap.status, SimulatedStatus::Failed);
        assert_eq!(
            engine.force_complete("0xmissing", true),
            Err(SimulationError::NotFound("0xmissing".to_string()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn forced_and_deadline_resolution_race_safely() {
        let engine = Arc::new(SimulatedComputeEngine::new(SimulatorConfig {
            min_duration: Duration::from_millis(1),
            max_duration: Duration::from_millis(2),
            success_ratio: 0.5,
            ..SimulatorConfig::default()
        }));
        let ids: Vec<String> = (0..64).map(|_| engine.submit("0xabc", "")).collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut handles = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let (poller, id_a) = (engine.clone(), id.clone());
            handles.push(tokio::spawn(async move {
                poller.poll_status(&id_a).unwrap()
            }));
            let (forcer, id_b) = (engine.clone(), id.clone());
            handles.push(tokio::spawn(async move {
                forcer.force_complete(&id_b, i % 2 == 0).unwrap()
            }));
        }
        for handle in handles {
            let snap = handle.await.unwrap();
            assert!(snap.status.is_terminal());
            assert_eq!(snap.result.is_some(), snap.status == SimulatedStatus::Completed);
        }

        for id in &ids {
            let settled = engine.poll_status(id).unwrap();
            assert!(settled.status.is_terminal());
            assert_eq!(settled.result.is_some(), settled.status == SimulatedStatus::Completed);
            let again = engine.poll_status(id).unwrap();
            assert_eq!((again.status, again.result), (settled.status, settled.result));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn purge_keeps_pending_and_fresh_results() {
        let engine = engine(1.0);
        let done = engine.submit("0xabc", "");
        engine.force_complete(&done, true).unwrap();
        advance(Duration::from_secs(30 * 60)).await;

        let pending = engine.submit("0xdef", "");
        engine.force_complete(&engine.submit("0x123", ""), false).unwrap();
        assert_eq!(engine.purge_expired(), 0);

        advance(Duration::from_secs(31 * 60)).await;
        assert_eq!(engine.purge_expired(), 1);
        assert!(engine.poll_status(&done).is_err());
        assert!(engine.poll_status(&pending).is_ok());
        assert_eq!(engine.list().len(), 2);
    }
}
