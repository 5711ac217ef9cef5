// SPDX-License-Identifier: MIT OR Apache-2.0
//! `aurorad-queued` — the scheduler.
//!
//! Periodically walks the catalog in priority order and enqueues a build
//! request for every package whose status cooldown has elapsed. On startup
//! it resets this instance's orphaned `processing` rows back to `unknown`.
#![deny(unsafe_code)]

mod schedule;

use anyhow::{Context, Result};
use aurora_bus as bus;
use aurora_catalog::Catalog;
use aurora_config::QueueConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aurorad-queued", version, about = "Aurora scheduler daemon")]
struct Args {
    /// Configuration file path.
    #[arg(short = 'c', long, default_value = "/etc/aurorad/queued.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: QueueConfig =
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

    info!(version = env!("CARGO_PKG_VERSION"), "starting up aurorad-queued");

    let instance =
        aurora_config::resolve_instance(&config.instance).context("unable to resolve instance")?;

    let catalog = Catalog::connect(&config.database)
        .await
        .context("unable to open the catalog")?;
    catalog.spawn_watcher();

    let reset = catalog
        .reset_processing(&instance)
        .await
        .context("unable to reset stuck processing packages")?;
    if reset > 0 {
        info!(count = reset, "stuck processing packages reset to unknown");
    }

    info!(address = %config.bus, "connecting to bus");
    let connection = bus::Connection::dial(&config.bus)
        .await
        .context("unable to dial bus")?;
    let channel = connection.channel().await.context("unable to open bus channel")?;
    let builds = channel
        .get_queue_publisher(bus::QUEUE_BUILDS)
        .await
        .context("unable to declare builds queue")?;
    info!(queue = bus::QUEUE_BUILDS, "queue publisher declared");

    schedule::enqueue_builds(&catalog, &builds, &config.interval).await
}
