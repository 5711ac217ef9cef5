// SPDX-License-Identifier: MIT OR Apache-2.0
//! `aurorad-procd` — the builder.
//!
//! Consumes build requests from the `builds` queue, runs one container per
//! package, streams live logs over its WebSocket endpoint, and hands
//! finished archives to the repository.
#![deny(unsafe_code)]

mod cloud;
mod proc;
mod task;

use anyhow::{Context, Result};
use aurora_config::ProcConfig;
use aurora_livelog::{LiveLog, server};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aurorad-procd", version, about = "Aurora builder daemon")]
struct Args {
    /// Configuration file path.
    #[arg(short = 'c', long, default_value = "/etc/aurorad/procd.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: ProcConfig =
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

    info!(version = env!("CARGO_PKG_VERSION"), "starting up aurorad-procd");

    let livelog = Arc::new(LiveLog::new());

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("unable to bind live-log server to {}", config.listen))?;
    info!(listen = %config.listen, "live-log server listening");

    let livelog_router = server::router(Arc::clone(&livelog));
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, livelog_router).await {
            tracing::error!(error = %err, "live-log server failed");
        }
    });

    let processor = proc::Processor::init(config, livelog)
        .await
        .context("unable to init processor")?;

    processor.serve().await
}
