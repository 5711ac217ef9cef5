// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builder startup and the worker pool.

use crate::cloud::Cloud;
use crate::task::Task;
use anyhow::{Context, Result};
use aurora_bus as bus;
use aurora_catalog::Catalog;
use aurora_config::ProcConfig;
use aurora_livelog::LiveLog;
use aurora_proto::{Build, is_valid_package_name};
use aurora_rpc::RpcClient;
use aurora_signature::Signer;
use aurora_storage::RepoLock;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, trace, warn};

/// The builder process: shared collaborators plus the resolved directories.
pub struct Processor {
    config: ProcConfig,
    instance: String,
    repo_dir: PathBuf,
    buffer_dir: PathBuf,
    logs_dir: PathBuf,
    threads: usize,
    cloud: Arc<Cloud>,
    catalog: Catalog,
    rpc: Arc<RpcClient>,
    signer: Arc<Signer>,
    livelog: Arc<LiveLog>,
    repo_lock: Arc<RepoLock>,
}

impl Processor {
    /// Prepare the builder: directories, repo-db lock check, container
    /// cleanup, catalog and RPC clients. Any failure here is fatal.
    pub async fn init(config: ProcConfig, livelog: Arc<LiveLog>) -> Result<Self> {
        let instance = aurora_config::resolve_instance(&config.instance)
            .context("unable to resolve instance")?;

        let (repo_dir, buffer_dir, logs_dir) = prepare_dirs(&config, &instance)?;

        aurora_storage::ensure_unlocked(&repo_dir)
            .context("repository database is locked")?;

        let threads = if config.threads == 0 {
            num_cpus::get()
        } else {
            config.threads
        };

        let cloud = Cloud::new(&config.base_image, config.resources.cpu, threads)
            .context("unable to init cloud (docker) client")?;
        cloud
            .cleanup()
            .await
            .context("unable to cleanup cloud before serving")?;

        let catalog = Catalog::connect(&config.database)
            .await
            .context("unable to open the catalog")?;
        catalog.spawn_watcher();

        let signer =
            Signer::from_key_file(&config.key).context("unable to load builder key")?;

        Ok(Self {
            instance,
            repo_dir: repo_dir.clone(),
            buffer_dir,
            logs_dir,
            threads,
            cloud: Arc::new(cloud),
            catalog,
            rpc: Arc::new(RpcClient::new(config.rpc.clone())),
            signer: Arc::new(signer),
            livelog,
            repo_lock: Arc::new(RepoLock::new(repo_dir)),
            config,
        })
    }

    /// Spawn the worker pool and serve until the broker goes away.
    ///
    /// Each worker owns its own channel with prefetch 1, so the broker
    /// round-robins one in-flight build per worker.
    pub async fn serve(self) -> Result<()> {
        info!(address = %self.config.bus, "connecting to bus");

        let connection = bus::Connection::dial(&self.config.bus)
            .await
            .context("unable to dial bus")?;

        let shared = Arc::new(self);

        let mut workers = Vec::with_capacity(shared.threads);
        for worker in 0..shared.threads {
            let channel = connection
                .channel()
                .await
                .context("unable to open bus channel")?;
            let consumer = channel
                .get_queue_consumer(bus::QUEUE_BUILDS)
                .await
                .context("unable to declare builds consumer")?;

            let shared = Arc::clone(&shared);
            workers.push(tokio::spawn(async move {
                shared.worker_loop(worker, consumer).await;
            }));
        }

        info!(
            threads = shared.threads,
            instance = %shared.instance,
            "worker pool spawned",
        );

        join_all(workers).await;

        Ok(())
    }

    async fn worker_loop(&self, worker: usize, mut consumer: bus::Consumer) {
        while let Some(delivery) = consumer.consume().await {
            let request: Build = match delivery.decode() {
                Ok(request) => request,
                Err(err) => {
                    error!(error = %err, "got unexpected item in queue");
                    reject(&delivery).await;
                    continue;
                }
            };

            trace!(worker, package = %request.package, "picked up build request");

            self.process_request(&request.package)
                .instrument(info_span!("build", package = %request.package, worker))
                .await;

            if let Err(err) = delivery.ack().await {
                warn!(error = %err, "unable to ack delivery");
            }
        }

        info!(worker, "queue builds has been closed, stopping");
    }

    async fn process_request(&self, name: &str) {
        if !is_valid_package_name(name) {
            warn!("dropping request with invalid package name");
            return;
        }

        let package = match self.catalog.find_one(name).await {
            Ok(Some(package)) => package,
            Ok(None) => {
                trace!("package is gone from the catalog, dropping request");
                return;
            }
            Err(err) => {
                error!(error = %err, "unable to fetch package, dropping request");
                return;
            }
        };

        let task = Task {
            package,
            instance: self.instance.clone(),
            repo_dir: self.repo_dir.clone(),
            buffer_dir: self.buffer_dir.clone(),
            logs_dir: self.logs_dir.clone(),
            history: self.config.history,
            build_timeout: self.config.build_timeout,
            cloud: Arc::clone(&self.cloud),
            catalog: self.catalog.clone(),
            rpc: Arc::clone(&self.rpc),
            signer: Arc::clone(&self.signer),
            livelog: Arc::clone(&self.livelog),
            repo_lock: Arc::clone(&self.repo_lock),
        };

        task.process().await;
    }
}

async fn reject(delivery: &bus::Delivery) {
    if let Err(err) = delivery.reject().await {
        warn!(error = %err, "unable to reject delivery");
    }
}

/// Absolutize and (re)create the working directories.
///
/// The buffer is instance-scoped and wiped on startup so stale artifacts
/// never leak into a fresh build.
fn prepare_dirs(config: &ProcConfig, instance: &str) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let repo_dir = std::path::absolute(&config.repo_dir)
        .with_context(|| format!("unable to resolve {}", config.repo_dir.display()))?;
    let buffer_dir = std::path::absolute(config.buffer_dir.join(instance))
        .with_context(|| format!("unable to resolve {}", config.buffer_dir.display()))?;
    let logs_dir = std::path::absolute(&config.logs_dir)
        .with_context(|| format!("unable to resolve {}", config.logs_dir.display()))?;

    match std::fs::remove_dir_all(&buffer_dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("unable to remove buffer directory {}", buffer_dir.display())
            });
        }
    }

    for dir in [&repo_dir, &buffer_dir, &logs_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("can't mkdir {}", dir.display()))?;
    }

    Ok((repo_dir, buffer_dir, logs_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &std::path::Path) -> ProcConfig {
        toml::from_str::<ProcConfig>(&format!(
            r#"
            instance = "builder-1"
            bus = "amqp://localhost"
            database = "mongodb://localhost/aurora"
            rpc = "https://aurora.example.com/rpc/"
            key = "/etc/aurorad/id_rsa"
            repo_dir = "{root}/repo"
            logs_dir = "{root}/logs"
            buffer_dir = "{root}/buffer"
            base_image = "aurora-builder:latest"

            [history]
            versions = 2
            builds_per_version = 1
            "#,
            root = root.display(),
        ))
        .unwrap()
    }

    #[test]
    fn prepare_dirs_creates_instance_scoped_buffer() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());

        let (repo, buffer, logs) = prepare_dirs(&config, "builder-1").unwrap();

        assert!(repo.ends_with("repo"));
        assert!(buffer.ends_with("buffer/builder-1"));
        assert!(logs.is_dir());
        assert!(buffer.is_dir());
    }

    #[test]
    fn prepare_dirs_wipes_previous_buffer_contents() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());

        let stale = root.path().join("buffer/builder-1/foo");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("foo-1.0-1-x86_64.pkg.tar.zst"), b"stale").unwrap();

        let (_, buffer, _) = prepare_dirs(&config, "builder-1").unwrap();

        assert!(buffer.is_dir());
        assert!(!buffer.join("foo").exists());
    }
}
