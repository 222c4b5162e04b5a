use crate::chain::ChainError;
use crate::simulate::SimulationError;
use crate::store::StoreError;
use ethers::types::H256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Nothing reached the settlement chain, the task may still be simulated
    #[error("settlement submission failed: {0}")]
    Submission(ChainError),
    #[error("settlement tx {0:?} reverted")]
    Reverted(H256),
    #[error("settlement tx {tx:?} not confirmed after {attempts} attempts")]
    Timeout { tx: H256, attempts: u32 },
    #[error("write back failed: {0}")]
    WriteBack(ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

impl SubmitError {
    pub fn allows_fallback(&self) -> bool {
        matches!(self, SubmitError::Submission(_))
    }
}

/// Aborts a single watcher tick, the cursor stays where it was
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
