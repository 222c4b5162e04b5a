use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches};
use std::time::Duration;
use taskrelay::config::*;

pub fn run_args<'a>() -> Vec<Arg<'a>> {
    vec![
        Arg::new("store")
            .long("store")
            .env("RELAY_STORE")
            .default_value("db")
            .value_parser(["db", "memory"])
            .help("where to keep task records, memory is lost on restart"),
        Arg::new("db-dsn")
            .long("db-dsn")
            .env("RELAY_DSN")
            .default_value("sqlite://taskrelay.db")
            .help("specify sqlite or mysql dsn to store task"),
        Arg::new("debug-sql")
            .long("debug-sql")
            .env("RELAY_DEBUG_SQL")
            .required(false)
            .action(ArgAction::SetTrue)
            .help("print sql to debug"),
        Arg::new("rpc-timeout")
            .long("rpc-timeout")
            .env("RELAY_RPC_TIMEOUT")
            .default_value("30s")
            .value_parser(humantime::parse_duration)
            .help("timeout of every chain rpc request"),
        Arg::new("origin-rpc")
            .long("origin-rpc")
            .env("RELAY_ORIGIN_RPC")
            .default_value("http://127.0.0.1:8545")
            .help("rpc endpoint of the origin chain"),
        Arg::new("origin-contract")
            .long("origin-contract")
            .env("RELAY_ORIGIN_CONTRACT")
            .required(true)
            .takes_value(true)
            .help("address of the market contract emitting TaskCreated"),
        Arg::new("poll-interval")
            .long("poll-interval")
            .env("RELAY_POLL_INTERVAL")
            .default_value("10s")
            .value_parser(humantime::parse_duration)
            .help("how often the origin chain is scanned"),
        Arg::new("initial-lookback")
            .long("initial-lookback")
            .env("RELAY_INITIAL_LOOKBACK")
            .default_value("100")
            .value_parser(value_parser!(u64))
            .help("blocks scanned on the first tick when the head was unknown at start"),
        Arg::new("settlement-enabled")
            .long("settlement-enabled")
            .env("RELAY_SETTLEMENT_ENABLED")
            .action(ArgAction::SetTrue)
            .help("submit tasks to the settlement chain instead of simulating them"),
        Arg::new("settlement-rpc")
            .long("settlement-rpc")
            .env("RELAY_SETTLEMENT_RPC")
            .default_value("https://sepolia-rollup.arbitrum.io/rpc")
            .help("rpc endpoint of the settlement chain"),
        Arg::new("settlement-chain-id")
            .long("settlement-chain-id")
            .env("RELAY_SETTLEMENT_CHAIN_ID")
            .default_value("421614")
            .value_parser(value_parser!(u64))
            .help("chain id used to sign settlement transactions"),
        Arg::new("settlement-key")
            .long("settlement-key")
            .env("RELAY_SETTLEMENT_KEY")
            .takes_value(true)
            .help("hex private key of the settlement account"),
        Arg::new("admin-key")
            .long("admin-key")
            .env("RELAY_ADMIN_KEY")
            .takes_value(true)
            .help("hex private key allowed to call completeTask, write back is skipped without it"),
        Arg::new("confirm-interval")
            .long("confirm-interval")
            .env("RELAY_CONFIRM_INTERVAL")
            .default_value("10s")
            .value_parser(humantime::parse_duration)
            .help("delay between settlement receipt checks"),
        Arg::new("confirm-attempts")
            .long("confirm-attempts")
            .env("RELAY_CONFIRM_ATTEMPTS")
            .default_value("60")
            .value_parser(value_parser!(u32))
            .help("receipt checks before a settlement tx is declared timed out"),
        Arg::new("priority-fee")
            .long("priority-fee")
            .env("RELAY_PRIORITY_FEE")
            .default_value("100000000")
            .value_parser(value_parser!(u64))
            .help("priority fee in wei added on top of 1.5x the base fee"),
        Arg::new("gas-limit")
            .long("gas-limit")
            .env("RELAY_GAS_LIMIT")
            .default_value("50000")
            .value_parser(value_parser!(u64))
            .help("gas limit of settlement transactions"),
        Arg::new("write-back-attempts")
            .long("write-back-attempts")
            .env("RELAY_WRITE_BACK_ATTEMPTS")
            .default_value("3")
            .value_parser(value_parser!(u32))
            .help("completeTask attempts before the result is parked"),
        Arg::new("write-back-backoff")
            .long("write-back-backoff")
            .env("RELAY_WRITE_BACK_BACKOFF")
            .default_value("5s")
            .value_parser(humantime::parse_duration)
            .help("delay between completeTask attempts"),
        Arg::new("sim-min-duration")
            .long("sim-min-duration")
            .env("RELAY_SIM_MIN_DURATION")
            .default_value("30s")
            .value_parser(humantime::parse_duration)
            .help("shortest simulated task"),
        Arg::new("sim-max-duration")
            .long("sim-max-duration")
            .env("RELAY_SIM_MAX_DURATION")
            .default_value("120s")
            .value_parser(humantime::parse_duration)
            .help("longest simulated task (exclusive)"),
        Arg::new("sim-success-ratio")
            .long("sim-success-ratio")
            .env("RELAY_SIM_SUCCESS_RATIO")
            .default_value("0.9")
            .value_parser(value_parser!(f64))
            .help("probability a simulated task completes"),
        Arg::new("sim-poll-interval")
            .long("sim-poll-interval")
            .env("RELAY_SIM_POLL_INTERVAL")
            .default_value("5s")
            .value_parser(humantime::parse_duration)
            .help("how often the relay checks a simulated task"),
        Arg::new("sim-retention")
            .long("sim-retention")
            .env("RELAY_SIM_RETENTION")
            .default_value("1h")
            .value_parser(humantime::parse_duration)
            .help("how long finished simulated tasks are kept"),
        Arg::new("sim-sweep-interval")
            .long("sim-sweep-interval")
            .env("RELAY_SIM_SWEEP_INTERVAL")
            .default_value("5m")
            .value_parser(humantime::parse_duration)
            .help("how often expired simulated tasks are purged"),
    ]
}

fn one<T: Clone + Send + Sync + 'static>(sub_m: &ArgMatches, name: &str) -> Result<T> {
    sub_m
        .get_one::<T>(name)
        .cloned()
        .ok_or_else(|| anyhow!("{} flag not found", name))
}

pub fn service_config(sub_m: &ArgMatches) -> Result<ServiceConfig> {
    let store = StoreKind::new(
        one::<String>(sub_m, "store")?.as_str(),
        one::<String>(sub_m, "db-dsn")?,
    );

    let mut watcher = WatcherConfig::new(
        one::<String>(sub_m, "origin-rpc")?,
        one::<String>(sub_m, "origin-contract")?,
    );
    watcher.poll_interval = one::<Duration>(sub_m, "poll-interval")?;
    watcher.initial_lookback = one::<u64>(sub_m, "initial-lookback")?;

    let mut cfg = ServiceConfig::new(
        one::<String>(sub_m, "url")?,
        store,
        one::<String>(sub_m, "log-level")?,
        one::<bool>(sub_m, "debug-sql")?,
        one::<Duration>(sub_m, "rpc-timeout")?,
        watcher,
    );

    cfg.settlement = SettlementConfig {
        enabled: one::<bool>(sub_m, "settlement-enabled")?,
        rpc_url: one::<String>(sub_m, "settlement-rpc")?,
        chain_id: one::<u64>(sub_m, "settlement-chain-id")?,
        private_key: sub_m.get_one::<String>("settlement-key").cloned(),
        confirm_interval: one::<Duration>(sub_m, "confirm-interval")?,
        confirm_attempts: one::<u32>(sub_m, "confirm-attempts")?,
        priority_fee_wei: one::<u64>(sub_m, "priority-fee")?,
        gas_limit: one::<u64>(sub_m, "gas-limit")?,
    };
    cfg.write_back = WriteBackConfig {
        admin_private_key: sub_m.get_one::<String>("admin-key").cloned(),
        attempts: one::<u32>(sub_m, "write-back-attempts")?,
        backoff: one::<Duration>(sub_m, "write-back-backoff")?,
    };
    cfg.simulator = SimulatorConfig {
        min_duration: one::<Duration>(sub_m, "sim-min-duration")?,
        max_duration: one::<Duration>(sub_m, "sim-max-duration")?,
        success_ratio: one::<f64>(sub_m, "sim-success-ratio")?,
        poll_interval: one::<Duration>(sub_m, "sim-poll-interval")?,
        retention: one::<Duration>(sub_m, "sim-retention")?,
        sweep_interval: one::<Duration>(sub_m, "sim-sweep-interval")?,
    };

    cfg.validate()?;
    Ok(cfg)
}
