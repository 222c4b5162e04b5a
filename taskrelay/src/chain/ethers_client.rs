use super::{ChainClient, ChainError, OriginContract, RawLog, TxReceipt};
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::signers::LocalWallet;
use ethers::types::{Address, BlockNumber, Bytes, Filter, H256, U256};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

abigen!(
    ComputeMarket,
    r#"[
        function completeTask(uint256 taskId, string resultHash)
    ]"#
);

fn http_provider(rpc_url: &str, timeout: Duration) -> Result<Provider<Http>, ChainError> {
    let url = reqwest::Url::parse(rpc_url)
        .map_err(|e| ChainError::InvalidInput(format!("rpc url {}: {}", rpc_url, e)))?;
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ChainError::Transport(e.to_string()))?;
    Ok(Provider::new(Http::new_with_client(url, client)))
}

impl From<ProviderError> for ChainError {
    fn from(e: ProviderError) -> Self {
        match &e {
            ProviderError::JsonRpcClientError(inner) if inner.as_error_response().is_some() => {
                ChainError::Rejected(e.to_string())
            }
            _ => ChainError::Transport(e.to_string()),
        }
    }
}

/// [`ChainClient`] over a plain JSON-RPC http endpoint
#[derive(Clone, Debug)]
pub struct EthersChainClient {
    provider: Provider<Http>,
}

impl EthersChainClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ChainError> {
        Ok(EthersChainClient {
            provider: http_provider(rpc_url, timeout)?,
        })
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn head_block(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn get_logs(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
        topic0: H256,
    ) -> Result<Vec<RawLog>, ChainError> {
        let filter = Filter::new()
            .address(contract)
            .from_block(from_block)
            .to_block(to_block)
            .topic0(topic0);
        let logs = self.provider.get_logs(&filter).await?;
        Ok(logs
            .into_iter()
            .map(|log| RawLog {
                topics: log.topics,
                data: log.data,
                block_number: log.block_number.map(|n| n.as_u64()),
                transaction_hash: log.transaction_hash,
            })
            .collect())
    }

    async fn send_raw_transaction(&self, signed_tx: Bytes) -> Result<H256, ChainError> {
        let pending = self.provider.send_raw_transaction(signed_tx).await?;
        Ok(pending.tx_hash())
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(|r| TxReceipt {
            transaction_hash: r.transaction_hash,
            status: r.status.map(|s| s.as_u64()),
            block_number: r.block_number.map(|n| n.as_u64()),
            gas_used: r.gas_used,
        }))
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await?)
    }

    async fn get_gas_price(&self) -> Result<U256, ChainError> {
        Ok(self.provider.get_gas_price().await?)
    }
}

type AdminClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Writes results back through `completeTask`, signed with the market admin key
pub struct EthersOriginContract {
    contract: ComputeMarket<AdminClient>,
}

impl EthersOriginContract {
    pub async fn connect(
        rpc_url: &str,
        contract_address: Address,
        admin_private_key: &str,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let provider = http_provider(rpc_url, timeout)?;
        let wallet: LocalWallet = admin_private_key
            .parse()
            .map_err(|e| ChainError::Signing(format!("invalid admin key: {}", e)))?;
        let client = SignerMiddleware::new_with_provider_chain(provider, wallet)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(EthersOriginContract {
            contract: ComputeMarket::new(contract_address, Arc::new(client)),
        })
    }
}

#[async_trait]
impl OriginContract for EthersOriginContract {
    async fn complete_task(
        &self,
        origin_task_id: &str,
        result_hash: &str,
    ) -> Result<Option<H256>, ChainError> {
        let task_id = U256::from_dec_str(origin_task_id)
            .map_err(|e| ChainError::InvalidInput(format!("task id {}: {}", origin_task_id, e)))?;

        let call = self.contract.complete_task(task_id, result_hash.to_string());
        let pending = call.send().await.map_err(|e| {
            if e.is_revert() {
                ChainError::Rejected(e.to_string())
            } else {
                ChainError::Transport(e.to_string())
            }
        })?;
        let tx_hash = pending.tx_hash();
        let receipt = pending
            .await?
            .ok_or_else(|| ChainError::Transport(format!("completeTask tx {:?} dropped", tx_hash)))?;

        if receipt.status.map(|s| s.as_u64()) != Some(1) {
            return Err(ChainError::Rejected(format!(
                "completeTask tx {:?} reverted",
                tx_hash
            )));
        }
        info!(
            "task {} completed on origin chain in tx {:?}",
            origin_task_id, tx_hash
        );
        Ok(Some(tx_hash))
    }
}

/// Used when no admin key is configured, results stay local
pub struct SkipWriteBack;

#[async_trait]
impl OriginContract for SkipWriteBack {
    async fn complete_task(
        &self,
        origin_task_id: &str,
        _result_hash: &str,
    ) -> Result<Option<H256>, ChainError> {
        warn!(
            "no admin key configured, skip writing result of task {} to origin chain",
            origin_task_id
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_rpc_url() {
        assert!(matches!(
            EthersChainClient::new("not a url", Duration::from_secs(1)),
            Err(ChainError::InvalidInput(_))
        ));
        EthersChainClient::new("http://127.0.0.1:8545", Duration::from_secs(1)).unwrap();
    }

    #[tokio::test]
    async fn skip_write_back_never_fails() {
        let res = SkipWriteBack.complete_task("1", "0xabc").await.unwrap();
        assert!(res.is_none());
    }
}
