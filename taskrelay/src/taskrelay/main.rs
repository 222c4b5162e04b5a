mod cli;

use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use ethers::types::Address;
use jsonrpsee::http_server::{HttpServerBuilder, HttpServerHandle, RpcModule};
use log::*;
use migration::Migrator;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::migrator::MigratorTrait;
use simplelog::*;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use taskrelay::chain::{
    ChainClient, EthersChainClient, EthersOriginContract, OriginContract, SkipWriteBack,
};
use taskrelay::config::*;
use taskrelay::relay::{ChainEventWatcher, CrossChainSubmitter, ResultWriter, TaskOrchestrator};
use taskrelay::rpc::{self, RelayImpl};
use taskrelay::simulate::SimulatedComputeEngine;
use taskrelay::store::{DbOpsImpl, InMemoryTaskStore, TaskRepo};
use taskrelay::utils::ensure_db_file;
use tokio::signal::ctrl_c;
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main()]
async fn main() {
    let app_m = Command::new("taskrelay")
        .version("0.1.0")
        .args(&[
            Arg::new("url")
                .long("url")
                .env("RELAY_URL")
                .global(true)
                .default_value("127.0.0.1:18890")
                .required(false)
                .help("specify url for provide service api service"),
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .env("RELAY_LOG_LEVEL")
                .default_value("info")
                .help("set log level for application"),
        ])
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("run the relay daemon")
                .args(cli::run_args()),
        )
        .subcommand(taskrelay::cli::task_cmds())
        .subcommand(taskrelay::cli::sim_cmds())
        .get_matches();

    let exec_result: Result<()> = match app_m.subcommand() {
        Some(("run", sub_m)) => start_server(sub_m).await,
        Some(("task", sub_m)) => taskrelay::cli::tasks_command(sub_m).await,
        Some(("sim", sub_m)) => taskrelay::cli::sim_command(sub_m).await,
        _ => Ok(()),
    };

    if let Err(e) = exec_result {
        println!("{:?}", e);
        std::process::exit(1);
    }
}

async fn start_server(sub_m: &ArgMatches) -> Result<()> {
    let cfg = cli::service_config(sub_m)?;

    let lv = LevelFilter::from_str(cfg.log_level.as_str())?;
    TermLogger::init(
        lv,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let store = open_store(&cfg).await?;
    let simulator = Arc::new(SimulatedComputeEngine::new(cfg.simulator.clone()));

    let contract_address = cfg
        .watcher
        .contract_address
        .parse::<Address>()
        .map_err(|e| anyhow!("invalid origin contract {}: {}", cfg.watcher.contract_address, e))?;
    let origin: Arc<dyn OriginContract + Send + Sync> = match &cfg.write_back.admin_private_key {
        Some(key) => Arc::new(
            EthersOriginContract::connect(
                &cfg.watcher.rpc_url,
                contract_address,
                key,
                cfg.rpc_timeout,
            )
            .await?,
        ),
        None => {
            warn!("no admin key configured, results will not be written back to the origin chain");
            Arc::new(SkipWriteBack)
        }
    };
    let writer = Arc::new(ResultWriter::new(
        origin,
        store.clone(),
        cfg.write_back.clone(),
    ));

    let submitter = if cfg.settlement.enabled {
        let client = Arc::new(EthersChainClient::new(
            &cfg.settlement.rpc_url,
            cfg.rpc_timeout,
        )?);
        let submitter = CrossChainSubmitter::new(
            client,
            store.clone(),
            writer.clone(),
            cfg.settlement.clone(),
        )?;
        info!(
            "settlement enabled on chain {} from account {:?}",
            cfg.settlement.chain_id,
            submitter.address()
        );
        Some(Arc::new(submitter))
    } else {
        info!("settlement disabled, every task runs on simulated compute");
        None
    };

    let orchestrator = Arc::new(TaskOrchestrator::new(
        store.clone(),
        submitter,
        simulator.clone(),
        writer,
    ));
    let interrupted = orchestrator.fail_interrupted().await?;
    if interrupted > 0 {
        warn!("{} tasks left open by the previous run were marked failed", interrupted);
    }

    let origin_client: Arc<dyn ChainClient + Send + Sync> = Arc::new(EthersChainClient::new(
        &cfg.watcher.rpc_url,
        cfg.rpc_timeout,
    )?);
    let watcher = ChainEventWatcher::new(origin_client, orchestrator, cfg.watcher.clone())?;
    let cursor = watcher.init_cursor().await;
    let watcher_handle = tokio::spawn(watcher.run(cursor));
    let _sweeper = simulator.clone().spawn_sweeper();

    let rpc_module = rpc::register(store, simulator);
    let (server_addr, handle) = start_api(cfg.url.as_str(), rpc_module).await?;
    info!("starting listening {}", server_addr);

    let mut sig_int = signal(SignalKind::interrupt())?;
    let mut sig_term = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sig_int.recv() => info!("receive SIGINT"),
        _ = sig_term.recv() => info!("receive SIGTERM"),
        _ = ctrl_c() => info!("receive Ctrl C"),
        res = watcher_handle => error!("watcher stopped unexpectedly: {:?}", res),
    }
    handle.stop()?;
    info!("Shutdown program");
    Ok(())
}

async fn open_store(cfg: &ServiceConfig) -> Result<Arc<dyn TaskRepo + Send + Sync>> {
    match &cfg.store {
        StoreKind::Memory => {
            warn!("using in-memory task store, tasks are lost on restart");
            Ok(Arc::new(InMemoryTaskStore::default()))
        }
        StoreKind::Db(dsn) => {
            ensure_db_file(dsn).await?;
            let mut opt = ConnectOptions::new(dsn.clone());
            opt.max_connections(10)
                .min_connections(1)
                .sqlx_logging(cfg.debug_sql)
                .max_lifetime(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(8))
                .idle_timeout(Duration::from_secs(8));

            let db_conn = Database::connect(opt).await?;
            Migrator::up(&db_conn, None).await?;
            Ok(Arc::new(DbOpsImpl::new(db_conn)))
        }
    }
}

async fn start_api(
    url: &str,
    module: RpcModule<RelayImpl>,
) -> Result<(SocketAddr, HttpServerHandle)> {
    let server = HttpServerBuilder::default().build(url.parse::<SocketAddr>()?)?;

    let addr = server.local_addr()?;
    let server_handle = server.start(module)?;

    Ok((addr, server_handle))
}
