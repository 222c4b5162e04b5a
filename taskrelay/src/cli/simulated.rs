use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::cli::utils::api_url;
use crate::rpc::get_relay_api;
use crate::simulate::SimulatedSnapshot;
use tabled::builder::Builder;
use tabled::settings::style::Style;

pub fn sim_cmds<'a>() -> Command<'a> {
    Command::new("sim")
        .arg_required_else_help(true)
        .about("inspect and drive simulated compute tasks")
        .subcommand(Command::new("list").about("list simulated tasks"))
        .subcommand(
            Command::new("get")
                .about("get simulated task detail")
                .args(&[Arg::new("id")
                    .last(true)
                    .takes_value(true)
                    .required(true)
                    .help("simulated task id")]),
        )
        .subcommand(
            Command::new("complete")
                .about("force a simulated task to finish now")
                .args(&[
                    Arg::new("fail")
                        .long("fail")
                        .action(ArgAction::SetTrue)
                        .help("finish as failed instead of completed"),
                    Arg::new("id")
                        .last(true)
                        .takes_value(true)
                        .required(true)
                        .help("simulated task id"),
                ]),
        )
}

pub async fn sim_command(sim_m: &ArgMatches) -> Result<()> {
    match sim_m.subcommand() {
        Some(("list", sub_m)) => {
            let relay_api = get_relay_api(api_url(sub_m)?).await?;
            print_snapshots(relay_api.list_simulated_task().await?)
        }
        Some(("get", sub_m)) => {
            let relay_api = get_relay_api(api_url(sub_m)?).await?;
            let snapshot = relay_api.get_simulated_task(sim_id(sub_m)?).await?;
            print_snapshots(vec![snapshot])
        }
        Some(("complete", sub_m)) => {
            let fail = *sub_m
                .get_one::<bool>("fail")
                .ok_or_else(|| anyhow!("fail flag not found"))?;
            let relay_api = get_relay_api(api_url(sub_m)?).await?;
            let snapshot = relay_api.force_complete(sim_id(sub_m)?, !fail).await?;
            println!("simulated task {} is now {}", snapshot.id, snapshot.status);
            Ok(())
        }
        _ => Err(anyhow!("command not found")),
    }
}

fn sim_id(sub_m: &ArgMatches) -> Result<String> {
    sub_m
        .get_one::<String>("id")
        .cloned()
        .ok_or_else(|| anyhow!("id argument not found"))
}

fn print_snapshots(snapshots: Vec<SimulatedSnapshot>) -> Result<()> {
    let mut builder = Builder::new();
    builder.set_header(["Id", "Requester", "Status", "Result", "Elapsed", "Remaining", "Params"]);
    for s in snapshots {
        builder.push_record([
            s.id.as_str(),
            s.requester.as_str(),
            s.status.to_string().as_str(),
            s.result.as_deref().unwrap_or_default(),
            format!("{}s", s.elapsed_secs).as_str(),
            format!("{}s", s.remaining_secs).as_str(),
            s.params.as_str(),
        ]);
    }
    println!("{}", builder.build().with(Style::ascii()));
    Ok(())
}
