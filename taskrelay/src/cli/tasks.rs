use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgMatches, Command};

use crate::cli::utils::{api_url, opt_timestamp_to_string, short_msg, timestamp_to_string};
use crate::rpc::get_relay_api;
use entity::tasks::Model as Task;
use entity::TaskStatus;
use tabled::builder::Builder;
use tabled::settings::style::Style;

pub fn task_cmds<'a>() -> Command<'a> {
    Command::new("task")
        .arg_required_else_help(true)
        .about("inspect relayed tasks")
        .subcommand(
            Command::new("list")
                .about("list relayed tasks")
                .args(&[Arg::new("status")
                    .long("status")
                    .multiple_values(true)
                    .takes_value(true)
                    .value_parser(value_parser!(i32))
                    .help("Created = 1\nProcessing = 2\nCompleted = 3\nFailed = 4")]),
        )
        .subcommand(
            Command::new("get")
                .about("get task detail")
                .args(&[Arg::new("id")
                    .last(true)
                    .takes_value(true)
                    .required(true)
                    .help("origin chain task id")]),
        )
}

pub async fn tasks_command(task_m: &ArgMatches) -> Result<()> {
    match task_m.subcommand() {
        Some(("list", sub_m)) => list_tasks(sub_m).await,
        Some(("get", sub_m)) => get_task(sub_m).await,
        _ => Err(anyhow!("command not found")),
    }
}

pub async fn get_task(sub_m: &ArgMatches) -> Result<()> {
    let url = api_url(sub_m)?;
    let id: String = sub_m
        .get_one::<String>("id")
        .ok_or_else(|| anyhow!("id argument not found"))?
        .clone();

    let relay_api = get_relay_api(url).await?;
    let task = relay_api.get_task(id).await?;
    print_one_task(task)
}

pub async fn list_tasks(sub_m: &ArgMatches) -> Result<()> {
    let url = api_url(sub_m)?;
    let status = match sub_m.get_many::<i32>("status") {
        Some(values) => Some(
            values
                .copied()
                .map(|e| TaskStatus::try_from(e).map_err(|_| anyhow!("unknown task status {}", e)))
                .collect::<Result<Vec<_>>>()?,
        ),
        None => None,
    };

    let relay_api = get_relay_api(url).await?;
    let tasks = relay_api.list_task(status).await?;
    print_task(tasks)
}

fn print_task(tasks: Vec<Task>) -> Result<()> {
    let mut builder = Builder::new();

    builder.set_header([
        "OriginTaskId",
        "Service",
        "Requester",
        "Status",
        "SettlementTx",
        "ComputeId",
        "Result",
        "Err",
        "CreateAt",
        "CompleteAt",
    ]);

    for task in tasks {
        builder.push_record([
            task.origin_task_id.as_str(),
            task.service_id.as_str(),
            task.requester_address.as_str(),
            task.status.to_string().as_str(),
            short_msg(task.settlement_task_id.as_deref().unwrap_or_default(), 12).as_str(),
            short_msg(task.external_compute_id.as_deref().unwrap_or_default(), 12).as_str(),
            short_msg(task.result_hash.as_deref().unwrap_or_default(), 16).as_str(),
            short_msg(task.error_msg.as_deref().unwrap_or_default(), 20).as_str(),
            timestamp_to_string(task.create_at).as_str(),
            opt_timestamp_to_string(task.complete_at).as_str(),
        ]);
    }
    println!("{}", builder.build().with(Style::ascii()));
    Ok(())
}

fn print_one_task(task: Task) -> Result<()> {
    let mut table = Builder::new();

    table
        .set_header(["Name", "Value"])
        .push_record(["OriginTaskId", task.origin_task_id.as_str()])
        .push_record(["Service", task.service_id.as_str()])
        .push_record(["Requester", task.requester_address.as_str()])
        .push_record(["Amount", task.amount.as_str()])
        .push_record(["EventTime", timestamp_to_string(task.event_timestamp).as_str()])
        .push_record(["Status", task.status.to_string().as_str()])
        .push_record(["SettlementTx", task.settlement_task_id.as_deref().unwrap_or_default()])
        .push_record(["ComputeId", task.external_compute_id.as_deref().unwrap_or_default()])
        .push_record(["Result", task.result_hash.as_deref().unwrap_or_default()])
        .push_record(["PendingResult", task.pending_result.as_deref().unwrap_or_default()])
        .push_record(["Err", task.error_msg.as_deref().unwrap_or_default()])
        .push_record(["Simulated", if task.fallback_attempted { "yes" } else { "no" }])
        .push_record(["CreateAt", timestamp_to_string(task.create_at).as_str()])
        .push_record(["UpdateAt", timestamp_to_string(task.update_at).as_str()])
        .push_record(["CompleteAt", opt_timestamp_to_string(task.complete_at).as_str()]);

    println!("{}", table.build().with(Style::ascii()));
    Ok(())
}
