// SPDX-License-Identifier: MIT OR Apache-2.0
//! `aurorad-storaged` — the archive indexer.
//!
//! Subscribes to the `archives` fan-out exchange, downloads each fresh
//! archive from the builder that produced it, registers it in the local
//! pacman repository database, and prunes old versions per the retention
//! policy.
#![deny(unsafe_code)]

mod server;

use anyhow::{Context, Result};
use aurora_config::StorageConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aurorad-storaged", version, about = "Aurora archive indexer daemon")]
struct Args {
    /// Configuration file path.
    #[arg(short = 'c', long, default_value = "/etc/aurorad/storaged.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: StorageConfig =
        aurora_config::load(&args.config).context("unable to load config")?;

    let level = if config.log.trace {
        "trace"
    } else if config.log.debug {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting up aurorad-storaged");

    server::Server::init(config).await?.serve().await
}
