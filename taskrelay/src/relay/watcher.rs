use super::{Admission, EventCursor, TaskOrchestrator, WatchError};
use crate::chain::{decode_task_created, task_created_topic, ChainClient, ChainError};
use crate::config::WatcherConfig;
use ethers::types::Address;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Outcome of one scanned block range
#[derive(Debug, Default)]
pub struct TickReport {
    pub from_block: u64,
    pub to_block: u64,
    pub accepted: usize,
    pub duplicates: usize,
    pub malformed: usize,
    /// pipelines started for the accepted tasks
    pub pipelines: Vec<JoinHandle<()>>,
}

/// Polls the origin chain for `TaskCreated` logs and hands them to the orchestrator
pub struct ChainEventWatcher {
    client: Arc<dyn ChainClient + Send + Sync>,
    contract: Address,
    orchestrator: Arc<TaskOrchestrator>,
    cfg: WatcherConfig,
}

impl ChainEventWatcher {
    pub fn new(
        client: Arc<dyn ChainClient + Send + Sync>,
        orchestrator: Arc<TaskOrchestrator>,
        cfg: WatcherConfig,
    ) -> Result<Self, ChainError> {
        let contract = cfg.contract_address.parse::<Address>().map_err(|e| {
            ChainError::InvalidInput(format!("contract address {}: {}", cfg.contract_address, e))
        })?;
        Ok(ChainEventWatcher {
            client,
            contract,
            orchestrator,
            cfg,
        })
    }

    /// Start from the current head so history is not replayed, or fall back to the
    /// initial lookback on the first tick if the head is unavailable
    pub async fn init_cursor(&self) -> EventCursor {
        match self.client.head_block().await {
            Ok(head) => {
                info!("watching {:?} from block {}", self.contract, head);
                EventCursor::at(head)
            }
            Err(e) => {
                warn!(
                    "cannot read origin chain head, first scan looks back {} blocks: {}",
                    self.cfg.initial_lookback, e
                );
                EventCursor::unset()
            }
        }
    }

    /// Scan everything after `cursor` up to the current head. The returned cursor only
    /// moves once every log in the range has been handled; on error the caller keeps
    /// the old one and the same range is scanned again.
    pub async fn tick(
        &self,
        cursor: EventCursor,
    ) -> Result<(EventCursor, Option<TickReport>), WatchError> {
        let head = self.client.head_block().await?;
        let (from, to) = match cursor.next_range(head, self.cfg.initial_lookback) {
            Some(range) => range,
            None => return Ok((cursor, None)),
        };
        debug!("scanning blocks {} to {} for TaskCreated", from, to);

        let logs = self
            .client
            .get_logs(self.contract, from, to, task_created_topic())
            .await?;

        let mut report = TickReport {
            from_block: from,
            to_block: to,
            ..TickReport::default()
        };
        for log in logs {
            let event = match decode_task_created(&log) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        "dropping log in block {:?} tx {:?}: {}",
                        log.block_number, log.transaction_hash, e
                    );
                    report.malformed += 1;
                    continue;
                }
            };
            info!(
                "TaskCreated task {} service {} buyer {} amount {} in block {:?}",
                event.origin_task_id,
                event.service_id,
                event.requester_address,
                event.amount,
                event.block_number
            );
            match self.orchestrator.on_task_created(&event).await? {
                Admission::Accepted(handle) => {
                    report.accepted += 1;
                    report.pipelines.push(handle);
                }
                Admission::Duplicate => report.duplicates += 1,
            }
        }

        Ok((cursor.advance(to), Some(report)))
    }

    pub async fn run(self, mut cursor: EventCursor) {
        let mut interval = tokio::time::interval(self.cfg.poll_interval);
        loop {
            interval.tick().await;
            match self.tick(cursor).await {
                Ok((next, Some(report))) => {
                    if report.accepted + report.duplicates + report.malformed > 0 {
                        info!(
                            "blocks {}..={}: {} accepted, {} duplicate, {} malformed",
                            report.from_block,
                            report.to_block,
                            report.accepted,
                            report.duplicates,
                            report.malformed
                        );
                    }
                    cursor = next;
                }
                Ok((next, None)) => cursor = next,
                Err(e) => error!(
                    "watcher tick failed, retrying from block {:?}: {}",
                    cursor.last_scanned(),
                    e
                ),
            }
        }
    }
}
