//! Chain access used by the relay.
//!
//! [`ChainClient`] is the thin RPC surface the watcher and the submitter need, and
//! [`OriginContract`] is the single write the relay performs on the origin chain.
//! Both are traits so the relay can be driven by scripted fakes in tests.

mod ethers_client;

pub use ethers_client::{EthersChainClient, EthersOriginContract, SkipWriteBack};

use crate::utils::to_hex;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use thiserror::Error;

/// `TaskCreated(uint256 indexed taskId, uint256 indexed serviceId, address indexed buyer, uint256 amount, uint256 timestamp)`
pub const TASK_CREATED_SIGNATURE: &str = "TaskCreated(uint256,uint256,address,uint256,uint256)";

pub fn task_created_topic() -> H256 {
    H256::from(keccak256(TASK_CREATED_SIGNATURE.as_bytes()))
}

#[derive(Debug, Error)]
pub enum ChainError {
    /// The node could not be reached or answered with garbage, worth retrying
    #[error("chain transport error: {0}")]
    Transport(String),
    /// The node understood the request and refused it
    #[error("rejected by node: {0}")]
    Rejected(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A log entry as returned by `eth_getLogs`
#[derive(Clone, Debug, Default)]
pub struct RawLog {
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<H256>,
}

#[derive(Clone, Debug)]
pub struct TxReceipt {
    pub transaction_hash: H256,
    /// 1 on success, 0 on revert, absent on pre-byzantium chains
    pub status: Option<u64>,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(1)
    }
}

#[async_trait]
pub trait ChainClient {
    async fn head_block(&self) -> Result<u64, ChainError>;
    async fn get_logs(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
        topic0: H256,
    ) -> Result<Vec<RawLog>, ChainError>;
    async fn send_raw_transaction(&self, signed_tx: Bytes) -> Result<H256, ChainError>;
    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>, ChainError>;
    /// Nonce of `address` including pending transactions
    async fn get_transaction_count(&self, address: Address) -> Result<U256, ChainError>;
    async fn get_gas_price(&self) -> Result<U256, ChainError>;
}

/// The origin chain market contract, only `completeTask` is ever called by the relay
#[async_trait]
pub trait OriginContract {
    /// Returns the hash of the transaction that completed the task, or `None` when
    /// the write was skipped on purpose
    async fn complete_task(
        &self,
        origin_task_id: &str,
        result_hash: &str,
    ) -> Result<Option<H256>, ChainError>;
}

/// A decoded `TaskCreated` event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskCreated {
    pub origin_task_id: String,
    pub service_id: String,
    pub requester_address: String,
    pub amount: U256,
    pub timestamp: i64,
    pub block_number: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid TaskCreated event: expected 4 topics, got {0}")]
    TopicCount(usize),
    #[error("log is not a TaskCreated event, topic0 {0:?}")]
    Signature(H256),
}

/// Decode a `TaskCreated` log. The three identity fields are indexed topics, `amount`
/// and `timestamp` live in the data section and default to zero when it is short.
pub fn decode_task_created(log: &RawLog) -> Result<TaskCreated, DecodeError> {
    if log.topics.len() < 4 {
        return Err(DecodeError::TopicCount(log.topics.len()));
    }
    if log.topics[0] != task_created_topic() {
        return Err(DecodeError::Signature(log.topics[0]));
    }

    let task_id = U256::from_big_endian(log.topics[1].as_bytes());
    let service_id = U256::from_big_endian(log.topics[2].as_bytes());
    let buyer = Address::from_slice(&log.topics[3].as_bytes()[12..]);

    let (amount, timestamp) = if log.data.len() >= 64 {
        (
            U256::from_big_endian(&log.data[0..32]),
            U256::from_big_endian(&log.data[32..64]),
        )
    } else {
        (U256::zero(), U256::zero())
    };
    let timestamp = if timestamp > U256::from(i64::MAX as u64) {
        i64::MAX
    } else {
        timestamp.as_u64() as i64
    };

    Ok(TaskCreated {
        origin_task_id: task_id.to_string(),
        service_id: service_id.to_string(),
        requester_address: to_hex(buyer.as_bytes()),
        amount,
        timestamp,
        block_number: log.block_number,
    })
}
