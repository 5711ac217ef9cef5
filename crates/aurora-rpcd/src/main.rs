// SPDX-License-Identifier: MIT OR Apache-2.0
//! `aurorad-rpcd` — the RPC facade.
//!
//! Serves the JSON-RPC surface over HTTP, verifies request signatures
//! against the authorized-keys directory, and fans successful-build
//! notices out to the archive indexers.
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use aurora_bus as bus;
use aurora_catalog::Catalog;
use aurora_config::RpcConfig;
use aurora_rpc::{AuthService, BuildService, PackageService, RpcServer, router};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aurorad-rpcd", version, about = "Aurora RPC facade daemon")]
struct Args {
    /// Configuration file path.
    #[arg(short = 'c', long, default_value = "/etc/aurorad/rpcd.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: RpcConfig =
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

    info!(version = env!("CARGO_PKG_VERSION"), "starting up aurorad-rpcd");

    let instance =
        aurora_config::resolve_instance(&config.instance).context("unable to resolve instance")?;

    let catalog = Catalog::connect(&config.database)
        .await
        .context("can't open aurora catalog")?;
    catalog.spawn_watcher();
    catalog
        .ensure_indexes()
        .await
        .context("can't ensure unique package name index")?;

    let auth = Arc::new(
        AuthService::new(&config.authorized_keys).context("unable to initialize auth service")?,
    );

    info!(address = %config.bus, "connecting to bus");
    let connection = bus::Connection::dial(&config.bus)
        .await
        .context("can't dial bus")?;
    let channel = connection
        .channel()
        .await
        .context("can't get bus channel")?;
    let archives = channel
        .get_exchange_publisher(bus::EXCHANGE_ARCHIVES)
        .await
        .context("can't declare archives exchange")?;

    let server = Arc::new(RpcServer {
        auth: Arc::clone(&auth),
        packages: Arc::new(PackageService::new(
            catalog.clone(),
            Arc::clone(&auth),
            config.logs_dir.clone(),
            instance,
            config.bus_port,
        )),
        builds: Arc::new(BuildService::new(catalog, auth, Arc::new(archives))),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("unable to bind {}", config.listen))?;

    info!(listen = %config.listen, "listening");

    axum::serve(listener, router(server))
        .await
        .context("serve")
}
