use crate::chain::{
    task_created_topic, ChainClient, ChainError, OriginContract, RawLog, TxReceipt,
};
use crate::store::{InMemoryTaskStore, NewTask, StoreError, Task, TaskRepo, TaskStatus};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// First well known hardhat/anvil dev account
pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// A well formed `TaskCreated` log with amount 1000 and timestamp 1700000000
pub fn task_created_log(task_id: u64, service_id: u64, buyer: Address, block: Option<u64>) -> RawLog {
    let mut data = [0u8; 64];
    U256::from(1_000u64).to_big_endian(&mut data[..32]);
    U256::from(1_700_000_000u64).to_big_endian(&mut data[32..]);
    let mut topic3 = [0u8; 32];
    topic3[12..].copy_from_slice(buyer.as_bytes());

    RawLog {
        topics: vec![
            task_created_topic(),
            H256::from_low_u64_be(task_id),
            H256::from_low_u64_be(service_id),
            H256::from(topic3),
        ],
        data: Bytes::from(data.to_vec()),
        block_number: block,
        transaction_hash: Some(H256::from_low_u64_be(task_id)),
    }
}

pub fn new_task(id: &str) -> NewTask {
    NewTask {
        origin_task_id: id.to_string(),
        service_id: "7".to_string(),
        requester_address: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".to_string(),
        amount: "1000".to_string(),
        event_timestamp: 1_700_000_000,
    }
}

/// Fresh in-memory sqlite with the schema applied. One connection only, every
/// pooled connection would otherwise see its own empty database.
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

/// Scripted chain: a settable head, canned logs filtered by block range, and
/// receipts that appear only when `auto_receipt` is set at send time
#[derive(Default)]
pub struct MockChainClient {
    head: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
    log_queries: Mutex<Vec<(u64, u64)>>,
    fail_logs: AtomicBool,
    fail_broadcast: AtomicBool,
    auto_receipt: Mutex<Option<u64>>,
    sent: Mutex<Vec<Bytes>>,
    receipts: Mutex<HashMap<H256, TxReceipt>>,
    receipt_polls: AtomicUsize,
}

impl MockChainClient {
    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push_log(&self, log: RawLog) {
        self.logs.lock().push(log);
    }

    pub fn set_fail_logs(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_broadcast(&self, fail: bool) {
        self.fail_broadcast.store(fail, Ordering::SeqCst);
    }

    /// Receipt status attached to every tx sent from now on, `None` leaves them pending
    pub fn set_auto_receipt(&self, status: Option<u64>) {
        *self.auto_receipt.lock() = status;
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.log_queries.lock().clone()
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn head_block(&self) -> Result<u64, ChainError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        _contract: Address,
        from_block: u64,
        to_block: u64,
        topic0: H256,
    ) -> Result<Vec<RawLog>, ChainError> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(ChainError::Transport("connection refused".to_string()));
        }
        assert_eq!(topic0, task_created_topic());
        self.log_queries.lock().push((from_block, to_block));
        Ok(self
            .logs
            .lock()
            .iter()
            .filter(|log| {
                log.block_number
                    .map_or(true, |n| n >= from_block && n <= to_block)
            })
            .cloned()
            .collect())
    }

    async fn send_raw_transaction(&self, signed_tx: Bytes) -> Result<H256, ChainError> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(ChainError::Rejected("nonce too low".to_string()));
        }
        let hash = H256::from(keccak256(&signed_tx));
        self.sent.lock().push(signed_tx);
        if let Some(status) = *self.auto_receipt.lock() {
            self.receipts.lock().insert(
                hash,
                TxReceipt {
                    transaction_hash: hash,
                    status: Some(status),
                    block_number: Some(1),
                    gas_used: Some(U256::from(21_000u64)),
                },
            );
        }
        Ok(hash)
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>, ChainError> {
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.lock().get(&tx_hash).cloned())
    }

    async fn get_transaction_count(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(U256::from(self.sent.lock().len()))
    }

    async fn get_gas_price(&self) -> Result<U256, ChainError> {
        Ok(U256::from(1_000_000_000u64))
    }
}

/// Records `completeTask` calls, failing the next `n` when asked to
#[derive(Default)]
pub struct MockOriginContract {
    calls: Mutex<Vec<(String, String)>>,
    attempts: AtomicU32,
    fail_next: AtomicU32,
}

impl MockOriginContract {
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Successful calls only
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginContract for MockOriginContract {
    async fn complete_task(
        &self,
        origin_task_id: &str,
        result_hash: &str,
    ) -> Result<Option<H256>, ChainError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(ChainError::Transport("origin node unavailable".to_string()));
        }
        self.calls
            .lock()
            .push((origin_task_id.to_string(), result_hash.to_string()));
        Ok(Some(H256::from(keccak256(result_hash))))
    }
}

/// In-memory store that counts successful `update_result` calls
pub struct RecordingStore {
    inner: InMemoryTaskStore,
    result_updates: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: InMemoryTaskStore) -> Self {
        RecordingStore {
            inner,
            result_updates: AtomicUsize::new(0),
        }
    }

    pub fn result_updates(&self) -> usize {
        self.result_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRepo for RecordingStore {
    async fn find_by_origin_id(&self, origin_task_id: &str) -> Result<Option<Task>, StoreError> {
        self.inner.find_by_origin_id(origin_task_id).await
    }

    async fn save(&self, task: NewTask) -> Result<Task, StoreError> {
        self.inner.save(task).await
    }

    async fn update_status(&self, origin_task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        self.inner.update_status(origin_task_id, status).await
    }

    async fn update_result(&self, origin_task_id: &str, result_hash: &str) -> Result<(), StoreError> {
        self.inner.update_result(origin_task_id, result_hash).await?;
        self.result_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_error(&self, origin_task_id: &str, message: &str) -> Result<(), StoreError> {
        self.inner.update_error(origin_task_id, message).await
    }

    async fn set_settlement_task_id(
        &self,
        origin_task_id: &str,
        settlement_task_id: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .set_settlement_task_id(origin_task_id, settlement_task_id)
            .await
    }

    async fn set_external_compute_id(
        &self,
        origin_task_id: &str,
        external_compute_id: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .set_external_compute_id(origin_task_id, external_compute_id)
            .await
    }

    async fn record_write_back_failure(
        &self,
        origin_task_id: &str,
        result: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .record_write_back_failure(origin_task_id, result, message)
            .await
    }

    async fn claim_fallback(&self, origin_task_id: &str) -> Result<bool, StoreError> {
        self.inner.claim_fallback(origin_task_id).await
    }

    async fn list_task(&self, status: Option<Vec<TaskStatus>>) -> Result<Vec<Task>, StoreError> {
        self.inner.list_task(status).await
    }
}
