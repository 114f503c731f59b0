mod cli;

use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use liquidd::{application::Application, config::ConfigManager};
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use crate::cli::Cli;

const DAEMON_LOG: &str = "/var/tmp/liquidd.log";

fn init_log(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "liquidd".into(),
        pid: 0,
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create(DAEMON_LOG)
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_manager = ConfigManager::load(cli.config)?;

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        config_manager.config().log_level.into()
    };
    init_log(level)?;

    if cli.daemonize {
        into_daemon()?;
    }

    match config_manager.path() {
        Some(path) => info!("liquidd {} using {}", env!("CARGO_PKG_VERSION"), path.display()),
        None => info!("liquidd {} using built-in defaults", env!("CARGO_PKG_VERSION")),
    }

    // All device sessions share one scheduling thread.
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("tokio runtime")?
        .block_on(async {
            Application::builder()
                .with_config_manager(config_manager)
                .build()?
                .run()
                .await
        })
}
