// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::{Context, Result, bail};
use aurora_bus as bus;
use aurora_config::StorageConfig;
use aurora_proto::Archive;
use aurora_storage::{RepoLock, cleanup_repository_directory, ensure_unlocked};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// One indexer instance: its private exchange binding plus the local
/// repository directory it maintains.
pub struct Server {
    config: StorageConfig,
    directory: PathBuf,
    http: reqwest::Client,
    repo_lock: RepoLock,
    archives: bus::Consumer,
}

impl Server {
    /// Connect to the broker and verify the local repository is usable.
    pub async fn init(config: StorageConfig) -> Result<Self> {
        let instance = aurora_config::resolve_instance(&config.instance)
            .context("unable to resolve instance")?;

        let directory = std::path::absolute(&config.directory)
            .with_context(|| format!("unable to resolve {}", config.directory.display()))?;
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("can't mkdir {}", directory.display()))?;

        ensure_unlocked(&directory).context("repository database is locked")?;

        info!(address = %config.bus, "connecting to bus");
        let connection = bus::Connection::dial(&config.bus)
            .await
            .context("can't dial bus")?;
        let channel = connection
            .channel()
            .await
            .context("unable to create bus channel")?;

        let archives = channel
            .get_exchange_consumer(bus::EXCHANGE_ARCHIVES, &instance)
            .await
            .context("unable to declare archives consumer")?;

        info!(
            exchange = bus::EXCHANGE_ARCHIVES,
            instance = %instance,
            "exchange consumer declared",
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("aurorad-storaged/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("unable to build http client")?;

        Ok(Self {
            repo_lock: RepoLock::new(directory.clone()),
            directory,
            http,
            archives,
            config,
        })
    }

    /// Consume archive notices until the broker goes away.
    ///
    /// Delivery is at-least-once: a re-downloaded archive overwrites the
    /// same file and `repo-add` of an already-indexed archive is a no-op,
    /// so duplicates are harmless.
    pub async fn serve(mut self) -> Result<()> {
        while let Some(delivery) = self.archives.consume().await {
            let archive: Archive = match delivery.decode() {
                Ok(archive) => archive,
                Err(err) => {
                    error!(error = %err, "bug: unable to decode archive item");
                    reject(&delivery).await;
                    continue;
                }
            };

            match self.pull(&archive).await {
                Ok(()) => {
                    if let Err(err) = delivery.ack().await {
                        warn!(error = %err, "unable to ack delivery");
                    }
                }
                Err(err) => {
                    error!(
                        archive = %archive.archive,
                        instance = %archive.instance,
                        error = %format!("{err:#}"),
                        "unable to ingest archive",
                    );
                    reject(&delivery).await;
                }
            }
        }

        info!("queue archives has been closed, stopping");

        Ok(())
    }

    /// Mirror one archive: download from the producing worker, index it,
    /// prune the package per the retention policy.
    async fn pull(&self, archive: &Archive) -> Result<()> {
        let Some(basename) = Path::new(&archive.archive)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
        else {
            bail!("archive notice carries no filename: {:?}", archive.archive);
        };

        let url = format!("https://{}/{}", archive.instance, archive.archive);
        let path = self.directory.join(&basename);

        info!(
            url = %url,
            path = %path.display(),
            "downloading archive {} from {}",
            archive.archive,
            archive.instance,
        );

        self.download(&url, &path).await?;

        info!(path = %path.display(), "adding file to repo db");

        self.repo_lock
            .repo_add(&path)
            .await
            .context("unable to repo-add the archive")?;

        cleanup_repository_directory(&self.directory, &archive.package, self.config.history)
            .context("unable to cleanup repository directory")?;

        Ok(())
    }

    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("unable to make a request: {url}"))?;

        if !response.status().is_success() {
            bail!("{url} answered {}", response.status());
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .context("unable to create resulting archive")?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("unable to read response body")?;
            file.write_all(&chunk)
                .await
                .context("unable to write archive to disk")?;
        }

        file.flush().await.context("unable to flush archive")?;

        Ok(())
    }
}

async fn reject(delivery: &bus::Delivery) {
    if let Err(err) = delivery.reject().await {
        warn!(error = %err, "unable to reject delivery");
    }
}
