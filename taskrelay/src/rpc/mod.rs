use crate::simulate::{SimulatedComputeEngine, SimulatedSnapshot};
use crate::store::{Task, TaskRepo, TaskStatus};
use crate::utils::{IntoAnyhow, IntoJsonRpcResult};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::RpcModule;
use log::info;
use std::sync::Arc;

#[rpc(server, client)]
pub trait RelayRpc {
    #[method(name = "Relay.GetTask")]
    async fn get_task(&self, origin_task_id: String) -> RpcResult<Task>;

    #[method(name = "Relay.ListTask")]
    async fn list_task(&self, status: Option<Vec<TaskStatus>>) -> RpcResult<Vec<Task>>;

    #[method(name = "Simulator.GetTask")]
    async fn get_simulated_task(&self, simulated_id: String) -> RpcResult<SimulatedSnapshot>;

    #[method(name = "Simulator.ListTask")]
    async fn list_simulated_task(&self) -> RpcResult<Vec<SimulatedSnapshot>>;

    #[method(name = "Simulator.ForceComplete")]
    async fn force_complete(
        &self,
        simulated_id: String,
        success: bool,
    ) -> RpcResult<SimulatedSnapshot>;
}

pub struct RelayImpl {
    store: Arc<dyn TaskRepo + Send + Sync>,
    simulator: Arc<SimulatedComputeEngine>,
}

#[async_trait]
impl RelayRpcServer for RelayImpl {
    /// Get relay task by origin chain task id
    async fn get_task(&self, origin_task_id: String) -> RpcResult<Task> {
        self.store
            .get_task(&origin_task_id)
            .await
            .internal_call_error()
    }

    /// List relay tasks, optionally only those in the given states
    async fn list_task(&self, status: Option<Vec<TaskStatus>>) -> RpcResult<Vec<Task>> {
        self.store.list_task(status).await.internal_call_error()
    }

    async fn get_simulated_task(&self, simulated_id: String) -> RpcResult<SimulatedSnapshot> {
        self.simulator.poll_status(&simulated_id).invalid_params()
    }

    async fn list_simulated_task(&self) -> RpcResult<Vec<SimulatedSnapshot>> {
        Ok(self.simulator.list())
    }

    /// Manual override for testing, the relay pipeline picks the outcome up on its next poll
    async fn force_complete(
        &self,
        simulated_id: String,
        success: bool,
    ) -> RpcResult<SimulatedSnapshot> {
        info!(
            "force completing simulated task {} success={}",
            simulated_id, success
        );
        self.simulator
            .force_complete(&simulated_id, success)
            .invalid_params()
    }
}

pub fn register(
    store: Arc<dyn TaskRepo + Send + Sync>,
    simulator: Arc<SimulatedComputeEngine>,
) -> RpcModule<RelayImpl> {
    RelayImpl { store, simulator }.into_rpc()
}

/// get relay api by url
pub async fn get_relay_api(url: String) -> anyhow::Result<WrapClient> {
    HttpClientBuilder::default()
        .build(url.as_str())
        .map(|client| WrapClient { client })
        .anyhow()
}

/// WrapClient converts rpc errors into anyhow errors for the cli
pub struct WrapClient {
    client: HttpClient,
}

impl WrapClient {
    pub async fn get_task(&self, origin_task_id: String) -> anyhow::Result<Task> {
        self.client.get_task(origin_task_id).await.anyhow()
    }

    pub async fn list_task(&self, status: Option<Vec<TaskStatus>>) -> anyhow::Result<Vec<Task>> {
        self.client.list_task(status).await.anyhow()
    }

    pub async fn get_simulated_task(&self, simulated_id: String) -> anyhow::Result<SimulatedSnapshot> {
        self.client.get_simulated_task(simulated_id).await.anyhow()
    }

    pub async fn list_simulated_task(&self) -> anyhow::Result<Vec<SimulatedSnapshot>> {
        self.client.list_simulated_task().await.anyhow()
    }

    pub async fn force_complete(
        &self,
        simulated_id: String,
        success: bool,
    ) -> anyhow::Result<SimulatedSnapshot> {
        self.client
            .force_complete(simulated_id, success)
            .await
            .anyhow()
    }
}
