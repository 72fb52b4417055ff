pub mod fetch;
pub mod inventory;

use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Local, NaiveDate, SecondsFormat, Utc};
use ooi_m2m::{config::default_cache_path, Config, RequestDescriptor};

pub use fetch::{fetch, files};
pub use inventory::inventory;

use super::{Cli, RequestArgs};

/// Builds the runtime configuration from global and request flags.
pub fn make_config(cli: &Cli, request: Option<&RequestArgs>) -> Config {
    let mut config = Config {
        base_url: cli.base_url.clone(),
        username: cli.username.clone(),
        token: cli.token.clone(),
        cache_path: cli.cache.clone().unwrap_or_else(default_cache_path),
        expiry_days: cli.expiry_days,
        connect_timeout: Duration::from_secs(cli.connect_timeout),
        read_timeout: Duration::from_secs(cli.read_timeout),
        ..Config::default()
    };

    if let Some(request) = request {
        config.format = request.format;
        config.file_pattern = request.pattern.clone();
        config.exclude = request.exclude.clone();
        config.max_attempts = request.max_attempts;
        config.poll_interval = Duration::from_secs(request.poll_interval);
        config.max_workers = request.workers;
        config.concurrency_threshold = request.threshold;
    }

    config
}

impl RequestArgs {
    pub fn descriptor(&self) -> Result<RequestDescriptor> {
        Ok(RequestDescriptor {
            site: self.site.clone(),
            node: self.node.clone(),
            sensor: self.sensor.clone(),
            method: self.method.clone(),
            stream: self.stream.clone(),
            begin: normalise_time(&self.begin)?,
            end: normalise_time(&self.end)?,
        })
    }
}

/// Formats a timestamp the way the service expects, `2023-01-01T00:00:00.000Z`.
pub fn normalise_time(input: &str) -> Result<String> {
    let time = match DateTime::parse_from_rfc3339(input) {
        Ok(time) => time.with_timezone(&Utc),
        Err(_) => NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .map_err(|_| anyhow!("`{}` is neither RFC 3339 nor YYYY-MM-DD", input))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid date `{}`", input))?
            .and_utc(),
    };

    Ok(time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn make_parquet_file_name(descriptor: &RequestDescriptor) -> PathBuf {
    let today = Local::now();
    let file_name = format!(
        "ooi-{}-{}-{}-{}-{:02}-{:02}.parquet",
        descriptor.site,
        descriptor.node,
        descriptor.sensor,
        today.year(),
        today.month(),
        today.day()
    );

    home_dir().join(file_name.to_lowercase())
}

pub fn make_download_dir(descriptor: &RequestDescriptor) -> PathBuf {
    let today = Local::now();
    let dir_name = format!(
        "ooi-{}-{}-{:02}-{:02}",
        descriptor.stream,
        today.year(),
        today.month(),
        today.day()
    );

    home_dir().join(dir_name)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// -- Tests -------------------------------------------------------------------
