use super::{RelayRequest, SubmitError};
use crate::chain::{ChainClient, ChainError, OriginContract, TxReceipt};
use crate::config::{SettlementConfig, WriteBackConfig};
use crate::store::TaskRepo;
use crate::utils::to_hex;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Eip1559TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// `baseFee * 1.5 + priorityFee`, headroom for the base fee rising before inclusion
pub fn max_fee_per_gas(base_fee: U256, priority_fee: U256) -> U256 {
    base_fee * 3 / 2 + priority_fee
}

/// Result artifact of a confirmed settlement tx, `keccak256(txHash ‖ originTaskId)`
pub fn derive_result(tx_hash: H256, origin_task_id: &str) -> String {
    let mut preimage = tx_hash.as_bytes().to_vec();
    preimage.extend_from_slice(origin_task_id.as_bytes());
    to_hex(keccak256(preimage))
}

/// Final hop shared by the settlement and simulated paths: write the result to the
/// origin contract, then record it locally
pub struct ResultWriter {
    origin: Arc<dyn OriginContract + Send + Sync>,
    store: Arc<dyn TaskRepo + Send + Sync>,
    cfg: WriteBackConfig,
}

impl ResultWriter {
    pub fn new(
        origin: Arc<dyn OriginContract + Send + Sync>,
        store: Arc<dyn TaskRepo + Send + Sync>,
        cfg: WriteBackConfig,
    ) -> Self {
        ResultWriter { origin, store, cfg }
    }

    pub async fn complete(&self, origin_task_id: &str, result: &str) -> Result<(), SubmitError> {
        let attempts = self.cfg.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.origin.complete_task(origin_task_id, result).await {
                Ok(tx) => {
                    if let Some(tx) = tx {
                        info!(
                            "result of task {} written back in tx {:?}",
                            origin_task_id, tx
                        );
                    }
                    break;
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "write back of task {} failed (attempt {}/{}): {}",
                        origin_task_id, attempt, attempts, e
                    );
                    tokio::time::sleep(self.cfg.backoff).await;
                }
                Err(e) => {
                    let msg = format!("write back failed after {} attempts: {}", attempts, e);
                    error!("task {}: {}, result {} kept as pending", origin_task_id, msg, result);
                    self.store
                        .record_write_back_failure(origin_task_id, result, &msg)
                        .await?;
                    return Err(SubmitError::WriteBack(e));
                }
            }
        }

        self.store.update_result(origin_task_id, result).await?;
        info!("task {} completed with result {}", origin_task_id, result);
        Ok(())
    }
}

/// Represents a task on the settlement chain, waits for it to land and hands the
/// derived result to the [`ResultWriter`]
pub struct CrossChainSubmitter {
    client: Arc<dyn ChainClient + Send + Sync>,
    wallet: LocalWallet,
    store: Arc<dyn TaskRepo + Send + Sync>,
    writer: Arc<ResultWriter>,
    cfg: SettlementConfig,
}

impl CrossChainSubmitter {
    pub fn new(
        client: Arc<dyn ChainClient + Send + Sync>,
        store: Arc<dyn TaskRepo + Send + Sync>,
        writer: Arc<ResultWriter>,
        cfg: SettlementConfig,
    ) -> Result<Self, ChainError> {
        let key = cfg
            .private_key
            .as_deref()
            .ok_or_else(|| ChainError::Signing("no settlement private key".to_string()))?;
        let wallet: LocalWallet = key
            .parse()
            .map_err(|e| ChainError::Signing(format!("invalid settlement key: {}", e)))?;
        Ok(CrossChainSubmitter {
            client,
            wallet: wallet.with_chain_id(cfg.chain_id),
            store,
            writer,
            cfg,
        })
    }

    /// Settlement account, also the recipient of every relay tx
    pub fn address(&self) -> ethers::types::Address {
        self.wallet.address()
    }

    /// Run the whole settlement path for one task, returns the written-back result.
    /// Reverted and unconfirmed txs mark the task failed before returning.
    pub async fn relay(&self, req: &RelayRequest) -> Result<String, SubmitError> {
        let id = req.origin_task_id.as_str();
        let tx_hash = self.broadcast(req).await?;
        info!("task {} submitted to settlement chain in tx {:?}", id, tx_hash);
        self.store
            .set_settlement_task_id(id, &format!("{:?}", tx_hash))
            .await?;

        match self.await_confirmation(tx_hash).await {
            Ok(receipt) => info!(
                "settlement tx {:?} of task {} confirmed in block {:?}",
                tx_hash, id, receipt.block_number
            ),
            Err(e) => {
                error!("task {}: {}", id, e);
                self.store.update_error(id, &e.to_string()).await?;
                return Err(e);
            }
        }

        let result = derive_result(tx_hash, id);
        self.writer.complete(id, &result).await?;
        Ok(result)
    }

    /// Build, sign and send a self-transfer carrying the task identity
    pub async fn broadcast(&self, req: &RelayRequest) -> Result<H256, SubmitError> {
        let from = self.wallet.address();
        let nonce = self
            .client
            .get_transaction_count(from)
            .await
            .map_err(SubmitError::Submission)?;
        let base_fee = self
            .client
            .get_gas_price()
            .await
            .map_err(SubmitError::Submission)?;
        let priority_fee = U256::from(self.cfg.priority_fee_wei);

        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(from)
            .to(from)
            .value(0u64)
            .data(req.payload().into_bytes())
            .nonce(nonce)
            .gas(self.cfg.gas_limit)
            .max_priority_fee_per_gas(priority_fee)
            .max_fee_per_gas(max_fee_per_gas(base_fee, priority_fee))
            .chain_id(self.cfg.chain_id)
            .into();
        debug!(
            "task {} settlement tx nonce {} base fee {} max fee {}",
            req.origin_task_id,
            nonce,
            base_fee,
            max_fee_per_gas(base_fee, priority_fee)
        );

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| SubmitError::Submission(ChainError::Signing(e.to_string())))?;
        self.client
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(SubmitError::Submission)
    }

    /// Poll for the receipt every `confirm_interval`, giving up after `confirm_attempts`.
    /// Transport errors use up an attempt like a missing receipt does.
    pub async fn await_confirmation(&self, tx_hash: H256) -> Result<TxReceipt, SubmitError> {
        let attempts = self.cfg.confirm_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.cfg.confirm_interval).await;
            match self.client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.succeeded() => return Ok(receipt),
                Ok(Some(_)) => return Err(SubmitError::Reverted(tx_hash)),
                Ok(None) => debug!(
                    "settlement tx {:?} pending ({}/{})",
                    tx_hash, attempt, attempts
                ),
                Err(e) => warn!(
                    "receipt lookup for {:?} failed ({}/{}): {}",
                    tx_hash, attempt, attempts, e
                ),
            }
        }
        Err(SubmitError::Timeout {
            tx: tx_hash,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTaskStore, TaskStatus};
    use crate::test_utils::{new_task, MockChainClient, MockOriginContract, TEST_KEY};
    use ethers::utils::rlp::Rlp;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Fixture {
        client: Arc<MockChainClient>,
        origin: Arc<MockOriginContract>,
        store: Arc<InMemoryTaskStore>,
        submitter: CrossChainSubmitter,
    }

    async fn fixture(id: &str) -> Fixture {
        let client = Arc::new(MockChainClient::default());
        let origin = Arc::new(MockOriginContract::default());
        let store = Arc::new(InMemoryTaskStore::default());
        store.save(new_task(id)).await.unwrap();
        store
            .update_status(id, TaskStatus::Processing)
            .await
            .unwrap();

        let writer = Arc::new(ResultWriter::new(
            origin.clone(),
            store.clone(),
            WriteBackConfig::default(),
        ));
        let cfg = SettlementConfig {
            enabled: true,
            private_key: Some(TEST_KEY.to_string()),
            ..SettlementConfig::default()
        };
        let submitter =
            CrossChainSubmitter::new(client.clone(), store.clone(), writer, cfg).unwrap();
        Fixture {
            client,
            origin,
            store,
            submitter,
        }
    }

    fn request(id: &str) -> RelayRequest {
        RelayRequest::new(id, "7", "0x70997970c51812dc3a010c7d01b50e0d17dc79c8")
    }

    #[test]
    fn fee_adds_priority_to_one_and_a_half_base() {
        let fee = max_fee_per_gas(U256::from(2_000_000_000u64), U256::from(100_000_000u64));
        assert_eq!(fee, U256::from(3_100_000_000u64));
        assert_eq!(max_fee_per_gas(U256::zero(), U256::from(7)), U256::from(7));
    }

    #[test]
    fn result_depends_on_tx_and_task() {
        let tx = H256::repeat_byte(0xaa);
        let a = derive_result(tx, "1");
        assert_eq!(a, derive_result(tx, "1"));
        assert_ne!(a, derive_result(tx, "2"));
        assert_ne!(a, derive_result(H256::repeat_byte(0xbb), "1"));
        assert_eq!(a.len(), 66);
    }

    #[tokio::test]
    async fn broadcast_signs_self_transfer_with_task_payload() {
        let f = fixture("1").await;
        let tx_hash = f.submitter.broadcast(&request("1")).await.unwrap();

        let sent = f.client.sent();
        assert_eq!(sent.len(), 1);
        let raw = &sent[0];
        assert_eq!(raw[0], 0x02, "expected an EIP-1559 envelope");
        assert_eq!(tx_hash, H256::from(keccak256(raw)));

        let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(raw)).unwrap();
        let me = f.submitter.address();
        assert_eq!(signature.recover(tx.sighash()).unwrap(), me);
        assert_eq!(tx.to_addr(), Some(&me));
        assert_eq!(tx.value(), Some(&U256::zero()));
        assert_eq!(tx.gas(), Some(&U256::from(50_000u64)));
        assert_eq!(tx.chain_id().map(|c| c.as_u64()), Some(421614));
        assert_eq!(
            tx.data().map(|d| d.to_vec()),
            Some(b"Task:1,Service:7,User:0x70997970c51812dc3a010c7d01b50e0d17dc79c8".to_vec())
        );
        match tx {
            TypedTransaction::Eip1559(inner) => {
                // mock gas price is 1 gwei
                assert_eq!(inner.max_fee_per_gas, Some(U256::from(1_600_000_000u64)));
                assert_eq!(inner.max_priority_fee_per_gas, Some(U256::from(100_000_000u64)));
            }
            other => panic!("unexpected tx type {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_times_out_after_exact_budget() {
        let f = fixture("1").await;
        let start = Instant::now();
        let err = f.submitter.relay(&request("1")).await.unwrap_err();

        assert!(matches!(err, SubmitError::Timeout { attempts: 60, .. }), "{:?}", err);
        assert_eq!(f.client.receipt_polls(), 60);
        assert_eq!(start.elapsed(), Duration::from_secs(600));

        let task = f.store.get_task("1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.settlement_task_id.is_some());
        assert!(task.result_hash.is_none());
        assert!(f.origin.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_tx_fails_without_write_back() {
        let f = fixture("1").await;
        f.client.set_auto_receipt(Some(0));
        let err = f.submitter.relay(&request("1")).await.unwrap_err();

        assert!(matches!(err, SubmitError::Reverted(_)));
        assert!(!err.allows_fallback());
        assert_eq!(f.client.receipt_polls(), 1);
        assert_eq!(f.store.get_task("1").await.unwrap().status, TaskStatus::Failed);
        assert!(f.origin.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_tx_writes_result_back() {
        let f = fixture("1").await;
        f.client.set_auto_receipt(Some(1));
        let result = f.submitter.relay(&request("1")).await.unwrap();

        let task = f.store.get_task("1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result_hash.as_deref(), Some(result.as_str()));
        let tx: H256 = task.settlement_task_id.unwrap().parse().unwrap();
        assert_eq!(result, derive_result(tx, "1"));
        assert_eq!(f.origin.calls(), vec![("1".to_string(), result)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_broadcast_allows_fallback() {
        let f = fixture("1").await;
        f.client.set_fail_broadcast(true);
        let err = f.submitter.relay(&request("1")).await.unwrap_err();
        assert!(err.allows_fallback());
        // nothing was recorded, the caller decides what happens next
        assert_eq!(
            f.store.get_task("1").await.unwrap().status,
            TaskStatus::Processing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn write_back_retries_then_parks_result() {
        let f = fixture("1").await;
        f.client.set_auto_receipt(Some(1));
        f.origin.fail_next(3);
        let err = f.submitter.relay(&request("1")).await.unwrap_err();

        assert!(matches!(err, SubmitError::WriteBack(_)));
        assert_eq!(f.origin.attempts(), 3);
        let task = f.store.get_task("1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result_hash.is_none());
        assert!(task.pending_result.is_some());
        assert!(task.error_msg.unwrap().starts_with("write back failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn write_back_recovers_within_budget() {
        let f = fixture("1").await;
        f.client.set_auto_receipt(Some(1));
        f.origin.fail_next(2);
        f.submitter.relay(&request("1")).await.unwrap();

        assert_eq!(f.origin.attempts(), 3);
        assert_eq!(
            f.store.get_task("1").await.unwrap().status,
            TaskStatus::Completed
        );
    }
}
