#![deny(missing_docs)]
//! Binary for the clustervisor(1) process supervisor; for the library use the
//! clustervisor-impl crate.
use std::{os::unix::process::CommandExt, process::Command, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{App, Arg};
use clustervisor_impl::{SupervisorBuilder, WorkerCount, WorkersOverrides};
use log::info;
use serde::{Deserialize, Serialize};

/// Settings deserialized from the configuration file.
#[derive(Debug, Serialize, Deserialize)]
struct Settings {
    /// Command each worker runs.
    command: String,
    /// Arguments for the command.
    #[serde(default)]
    args: Vec<String>,
    /// Worker pool settings.
    #[serde(default)]
    workers: WorkerSettings,
}

/// Worker pool settings, durations are in milliseconds.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct WorkerSettings {
    /// Number of workers, an integer or `"auto"`.
    count: Option<CountSetting>,
    /// Exit workers after an uncaught fault.
    restart_on_fault: Option<bool>,
    /// Delay before a dead worker is replaced.
    restart_delay: Option<u64>,
    /// Grace window before a forced shutdown.
    shutdown_grace: Option<u64>,
}

/// Worker count as written in the configuration file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CountSetting {
    Fixed(i64),
    Named(String),
}

impl TryFrom<WorkerSettings> for WorkersOverrides {
    type Error = anyhow::Error;

    fn try_from(settings: WorkerSettings) -> Result<Self> {
        let count = match settings.count {
            Some(CountSetting::Fixed(count)) => Some(WorkerCount::Fixed(count)),
            Some(CountSetting::Named(name)) => Some(name.parse::<WorkerCount>()?),
            None => None,
        };
        Ok(WorkersOverrides {
            count,
            restart_on_fault: settings.restart_on_fault,
            restart_delay: settings.restart_delay.map(Duration::from_millis),
            shutdown_grace: settings.shutdown_grace.map(Duration::from_millis),
        })
    }
}

/// Executable entry point.
#[doc(hidden)]
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").ok().is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let matches = App::new("clustervisor")
        .version("1.0")
        .about("Process supervisor")
        .long_about(
            "Reads the TOML configuration file and runs the command in a pool \
             of worker processes that are restarted when they die.",
        )
        .arg(
            Arg::with_name("config")
                .help("Configuration file")
                .required(true),
        )
        .get_matches();

    let config = matches
        .value_of("config")
        .ok_or_else(|| anyhow!("Configuration file is required!"))?;
    let contents = std::fs::read_to_string(config)
        .with_context(|| format!("Failed to read configuration {}", config))?;
    let settings: Settings = toml::from_str(&contents)?;
    let workers = WorkersOverrides::try_from(settings.workers)?;

    let Settings { command, args, .. } = settings;
    if clustervisor_impl::worker_id().is_none() {
        info!("Supervise {} {}", command, args.join(" "));
    }

    SupervisorBuilder::new(move || async move {
        // Only returns when the command could not be executed
        Err::<(), _>(Command::new(&command).args(&args).exec())
    })
    .workers(workers)
    .build()
    .run()
    .await?;

    Ok(())
}
