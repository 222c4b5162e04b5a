use anyhow::{anyhow, Result};
use chrono::{Local, LocalResult, TimeZone};
use clap::ArgMatches;

pub fn timestamp_to_string(tm: i64) -> String {
    match Local.timestamp_opt(tm, 0) {
        LocalResult::None => "".to_string(),
        LocalResult::Single(v) => v.to_string(),
        LocalResult::Ambiguous(v1, v2) => format!("{}, {}", v1, v2),
    }
}

pub fn opt_timestamp_to_string(tm: Option<i64>) -> String {
    tm.map(timestamp_to_string).unwrap_or_default()
}

pub fn short_msg(msg: &str, len: usize) -> String {
    if msg.chars().count() > len {
        let mut pre_msg: String = msg.chars().take(len).collect();
        pre_msg.push_str("...");
        pre_msg
    } else {
        msg.to_string()
    }
}

/// The `--url` flag is a listen address, clients need a scheme in front of it
pub fn api_url(sub_m: &ArgMatches) -> Result<String> {
    let url = sub_m
        .get_one::<String>("url")
        .ok_or_else(|| anyhow!("url flag not found"))?;
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.clone())
    } else {
        Ok(format!("http://{}", url))
    }
}
