use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_INITIAL_LOOKBACK: u64 = 100;
pub const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CONFIRM_ATTEMPTS: u32 = 60;
/// 0.1 gwei
pub const DEFAULT_PRIORITY_FEE_WEI: u64 = 100_000_000;
pub const DEFAULT_GAS_LIMIT: u64 = 50_000;
pub const DEFAULT_SETTLEMENT_CHAIN_ID: u64 = 421614;

/// Where relay tasks are persisted, the first is a sea-orm database addressed by dsn,
/// the second keeps everything in process memory and is lost on restart
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Db(String),
    Memory,
}

impl StoreKind {
    pub fn new(store_type: &str, db_dsn: String) -> Self {
        if store_type == "memory" {
            StoreKind::Memory
        } else {
            StoreKind::Db(db_dsn)
        }
    }
}

/// Origin chain polling settings
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub poll_interval: Duration,
    /// how many blocks the first scan reaches back when no cursor could be established
    pub initial_lookback: u64,
}

impl WatcherConfig {
    pub fn new(rpc_url: String, contract_address: String) -> Self {
        WatcherConfig {
            rpc_url,
            contract_address,
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_lookback: DEFAULT_INITIAL_LOOKBACK,
        }
    }
}

/// Settlement chain submission and confirmation settings
#[derive(Clone, Debug)]
pub struct SettlementConfig {
    pub enabled: bool,
    pub rpc_url: String,
    pub chain_id: u64,
    pub private_key: Option<String>,
    pub confirm_interval: Duration,
    pub confirm_attempts: u32,
    pub priority_fee_wei: u64,
    pub gas_limit: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        SettlementConfig {
            enabled: false,
            rpc_url: "https://sepolia-rollup.arbitrum.io/rpc".to_string(),
            chain_id: DEFAULT_SETTLEMENT_CHAIN_ID,
            private_key: None,
            confirm_interval: DEFAULT_CONFIRM_INTERVAL,
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            priority_fee_wei: DEFAULT_PRIORITY_FEE_WEI,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// Settings for writing results back to the origin chain contract
#[derive(Clone, Debug)]
pub struct WriteBackConfig {
    pub admin_private_key: Option<String>,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        WriteBackConfig {
            admin_private_key: None,
            attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Simulated compute backend settings
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub success_ratio: f64,
    pub poll_interval: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            min_duration: Duration::from_secs(30),
            max_duration: Duration::from_secs(120),
            success_ratio: 0.9,
            poll_interval: Duration::from_secs(5),
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Save configuration information related to the relay daemon
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub url: String,
    pub store: StoreKind,
    pub log_level: String,
    pub debug_sql: bool,
    pub rpc_timeout: Duration,

    pub watcher: WatcherConfig,
    pub settlement: SettlementConfig,
    pub write_back: WriteBackConfig,
    pub simulator: SimulatorConfig,
}

impl ServiceConfig {
    pub fn new(
        url: String,
        store: StoreKind,
        log_level: String,
        debug_sql: bool,
        rpc_timeout: Duration,
        watcher: WatcherConfig,
    ) -> Self {
        Self {
            url,
            store,
            log_level,
            debug_sql,
            rpc_timeout,
            watcher,
            settlement: SettlementConfig::default(),
            write_back: WriteBackConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }

    /// Reject combinations that would only fail later inside a task pipeline
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.settlement.enabled && self.settlement.private_key.is_none() {
            anyhow::bail!("settlement is enabled but no settlement private key is configured");
        }
        if self.simulator.min_duration >= self.simulator.max_duration {
            anyhow::bail!(
                "simulated min duration {:?} must be below max duration {:?}",
                self.simulator.min_duration,
                self.simulator.max_duration
            );
        }
        if !(0.0..=1.0).contains(&self.simulator.success_ratio) {
            anyhow::bail!(
                "simulated success ratio {} is outside [0, 1]",
                self.simulator.success_ratio
            );
        }
        if self.settlement.confirm_attempts == 0 || self.write_back.attempts == 0 {
            anyhow::bail!("confirm attempts and write back attempts must be at least 1");
        }
        Ok(())
    }
}
