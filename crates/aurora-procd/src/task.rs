// SPDX-License-Identifier: MIT OR Apache-2.0
//! One build attempt, start to finish.
//!
//! The pipeline: retention sweep → status `processing` → container → pkgver
//! phase (with the unchanged-version short-circuit) → build phase →
//! artifact collection → `repo-add` → finalize. Failures never escape a
//! task; they become a recorded `failure` with an error string, and three
//! consecutive failures of a zero-priority package delete it.

use crate::cloud::Cloud;
use anyhow::{Context, Result, anyhow, bail};
use aurora_catalog::{Catalog, CatalogError};
use aurora_livelog::{Frame, LiveLog};
use aurora_proto::{Build, Package, PackageStatus, RequestPushBuild, ResponsePushBuild};
use aurora_rpc::{RpcClient, methods};
use aurora_signature::Signer;
use aurora_storage::{ArchiveName, History, RepoLock, cleanup_repository_directory, newest_archive};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Consecutive failures after which a zero-priority package is dropped.
const FAILURES_TO_REMOVE: i64 = 3;

/// Deadline for the pkgver phase; generous, but a hung upstream probe must
/// not wedge a worker forever.
const PKGVER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Everything a worker needs to process one build request.
pub struct Task {
    pub package: Package,
    pub instance: String,
    pub repo_dir: PathBuf,
    pub buffer_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub history: History,
    pub build_timeout: Duration,
    pub cloud: Arc<Cloud>,
    pub catalog: Catalog,
    pub rpc: Arc<RpcClient>,
    pub signer: Arc<Signer>,
    pub livelog: Arc<LiveLog>,
    pub repo_lock: Arc<RepoLock>,
}

enum Outcome {
    Built { archive: String, pkgver: String },
    PkgverUnchanged,
}

impl Task {
    /// Run the pipeline; never returns an error — every failure path ends
    /// in a recorded `failure` status.
    pub async fn process(mut self) {
        info!(package = %self.package.name, "starting build");

        let previous_status = self.package.status;
        self.update_status(PackageStatus::Processing).await;
        self.push_build(Build::new(&self.package.name, PackageStatus::Processing))
            .await;

        if let Err(err) =
            cleanup_repository_directory(&self.repo_dir, &self.package.name, self.history)
        {
            warn!(error = %err, "retention sweep failed");
        }

        let container_name = format!("{}-{}", self.package.name, Utc::now().timestamp());

        self.publish_log("builder: Creating container for makepkg\n");

        let result = match self
            .cloud
            .create_container(
                &self.buffer_dir,
                &container_name,
                &self.package.name,
                self.package.clone_url.as_deref(),
                self.package.subdir.as_deref(),
            )
            .await
            .context("can't create container")
        {
            Ok(_) => {
                debug!(container = %container_name, "container created");

                let result = self.build(&container_name, previous_status).await;

                // The container goes away no matter how the build ended.
                if let Err(err) = self.cloud.destroy_container(&container_name).await {
                    warn!(container = %container_name, error = %err, "unable to destroy container");
                } else {
                    debug!(container = %container_name, "container destroyed");
                }

                result
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(Outcome::Built { archive, pkgver }) => {
                info!(package = %self.package.name, archive = %archive, "package is ready");
                self.finalize_success(archive, pkgver).await;
            }
            Ok(Outcome::PkgverUnchanged) => {
                info!(
                    package = %self.package.name,
                    pkgver = %self.package.version,
                    "pkgver not changed, skipping",
                );

                // A recorded success must reference an archive; with the
                // version unchanged that is the newest one already in the
                // repository. None on disk means repository and catalog
                // disagree, which is a failure, not a success.
                match newest_archive(&self.repo_dir, &self.package.name) {
                    Some(archive) => {
                        let version = self.package.version.clone();
                        self.finalize_success(archive, version).await;
                    }
                    None => {
                        error!(
                            package = %self.package.name,
                            "pkgver not changed but no archive exists in the repository",
                        );
                        self.finalize_failure(
                            "pkgver not changed but no archive exists in the repository"
                                .to_string(),
                        )
                        .await;
                    }
                }
            }
            Err(err) => {
                error!(package = %self.package.name, error = %format!("{err:#}"), "build failed");
                self.finalize_failure(format!("{err:#}")).await;
            }
        }
    }

    async fn build(&mut self, container_name: &str, previous_status: PackageStatus) -> Result<Outcome> {
        self.cloud
            .start_container(container_name)
            .await
            .context("can't start container")?;

        self.publish_log("builder: Retrieving PKGVER\n");

        let pkgver_started = Instant::now();
        let pkgver = self.read_pkgver(container_name).await?;
        self.package.pkgver_time = pkgver_started.elapsed().as_secs_f64();

        if pkgver == self.package.version && previous_status != PackageStatus::Failure {
            self.publish_log("builder: PKGVER is not changed\n");
            return Ok(Outcome::PkgverUnchanged);
        }

        self.publish_log(&format!(
            "builder: PKGVER is {:?} (was {:?})\n",
            pkgver, self.package.version,
        ));

        debug!("building package");
        self.publish_log("builder: Starting build\n");

        let build_started = Instant::now();
        self.run_build(container_name).await?;
        self.package.build_time = build_started.elapsed().as_secs_f64();

        if let Err(err) = self
            .cloud
            .write_logs(&self.logs_dir, container_name, &self.package.name)
            .await
        {
            warn!(container = %container_name, error = %err, "can't write container logs");
        }

        self.cloud
            .state_error(container_name)
            .await
            .context("unexpected container state (maybe old image?)")?;

        self.publish_log("builder: Build finished\n");

        let archive = self.collect_archive().await?;

        self.repo_lock
            .repo_add(&self.repo_dir.join(&archive))
            .await
            .context("unable to index archive")?;

        Ok(Outcome::Built { archive, pkgver })
    }

    async fn read_pkgver(&self, container_name: &str) -> Result<String> {
        let livelog = Arc::clone(&self.livelog);
        let topic = self.package.name.clone();

        self.cloud
            .exec(
                container_name,
                &["/app/pkgver.sh"],
                PKGVER_TIMEOUT,
                move |line| {
                    livelog.publish(&topic, Frame::Log(format!("pkgver: {line}\n")));
                },
            )
            .await
            .context("pkgver.sh failed")?;

        let path = self.buffer_dir.join(&self.package.name).join("pkgver");
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("unable to read file after pkgver: {}", path.display()))?;

        tokio::fs::remove_file(&path)
            .await
            .context("unable to remove pkgver file")?;

        Ok(contents.trim().to_string())
    }

    async fn run_build(&self, container_name: &str) -> Result<()> {
        let livelog = Arc::clone(&self.livelog);
        let topic = self.package.name.clone();

        self.cloud
            .exec(
                container_name,
                &["/app/run.sh"],
                self.build_timeout,
                move |line| {
                    livelog.publish(&topic, Frame::Log(format!("makepkg: {line}\n")));
                },
            )
            .await
            .context("run.sh failed")
    }

    /// Pick the newest `*.pkg.*` the container deposited and move it into
    /// the repository under a grammar-conforming basename.
    async fn collect_archive(&self) -> Result<String> {
        let package_buffer = self.buffer_dir.join(&self.package.name);
        let source = newest_buffer_archive(&package_buffer)
            .await
            .context("can't stat built package archive")?
            .ok_or_else(|| anyhow!("built archive file not found"))?;

        let basename = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let basename = if ArchiveName::parse(&basename).is_some() {
            basename
        } else if ArchiveName::is_bare(&basename) {
            format!("{}.{basename}", Utc::now().timestamp())
        } else {
            bail!("archive {basename:?} does not match the repository filename format");
        };

        let target = self.repo_dir.join(&basename);
        tokio::fs::rename(&source, &target)
            .await
            .context("unable to move archive from buffer")?;

        Ok(basename)
    }

    async fn finalize_success(&mut self, archive: String, pkgver: String) {
        self.package.failures = 0;
        self.package.version = pkgver;
        self.update_status(PackageStatus::Success).await;

        let mut build = Build::new(&self.package.name, PackageStatus::Success);
        build.archive = Some(archive);
        self.push_build(build).await;
    }

    async fn finalize_failure(&mut self, error: String) {
        self.package.failures += 1;
        self.update_status(PackageStatus::Failure).await;

        let mut build = Build::new(&self.package.name, PackageStatus::Failure);
        build.error = Some(error);
        self.push_build(build).await;

        if self.package.failures >= FAILURES_TO_REMOVE && self.package.priority == 0 {
            warn!(
                package = %self.package.name,
                failures = self.package.failures,
                "package failed too many times, removing it from the catalog",
            );

            match self.catalog.remove(&self.package.name).await {
                Ok(()) | Err(CatalogError::NotFound) => {}
                Err(err) => error!(error = %err, "unable to remove package"),
            }
        }
    }

    /// Record a status transition everywhere it is observed: the live-log
    /// topic and the catalog row.
    async fn update_status(&mut self, status: PackageStatus) {
        self.package.status = status;
        self.package.instance = self.instance.clone();
        self.package.updated_at = Utc::now();

        self.livelog
            .publish(&self.package.name, Frame::Status(status.to_string()));

        match self.catalog.update_package(&self.package).await {
            Ok(()) => info!(status = %status, "status"),
            Err(CatalogError::NotFound) => {
                warn!(package = %self.package.name, "package vanished mid-build");
            }
            Err(err) => error!(error = %err, "can't update package status"),
        }
    }

    /// Push the build event through the RPC facade; the facade stamps the
    /// instance from our signature and fans successful archives out to the
    /// indexers. Push failures are logged, never fatal to the build.
    async fn push_build(&self, build: Build) {
        let signature = match self.signer.sign() {
            Ok(signature) => signature,
            Err(err) => {
                error!(error = %err, "unable to sign build event");
                return;
            }
        };

        info!(build = %build, "publishing build");

        let request = RequestPushBuild {
            signature: Some(signature),
            build,
        };

        if let Err(err) = self
            .rpc
            .call::<_, ResponsePushBuild>(methods::PUSH_BUILD, &request)
            .await
        {
            error!(error = %err, "can't push build status");
        }
    }

    fn publish_log(&self, line: &str) {
        self.livelog
            .publish(&self.package.name, Frame::Log(line.to_string()));
    }
}

async fn newest_buffer_archive(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(".pkg.") {
            continue;
        }

        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().is_none_or(|(time, _)| modified > *time) {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn newest_buffer_archive_picks_latest_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("foo-1.0-1-x86_64.pkg.tar.zst");
        let new = dir.path().join("foo-1.0-2-x86_64.pkg.tar.zst");

        fs::write(&old, b"old").unwrap();
        fs::write(&new, b"new").unwrap();

        let past = std::time::SystemTime::now() - Duration::from_secs(3600);
        let file = fs::File::open(&old).unwrap();
        file.set_modified(past).unwrap();

        let picked = newest_buffer_archive(dir.path()).await.unwrap();
        assert_eq!(picked, Some(new));
    }

    #[tokio::test]
    async fn newest_buffer_archive_ignores_non_archives() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pkgver"), b"1.0-1").unwrap();
        fs::write(dir.path().join("build.log"), b"...").unwrap();

        assert_eq!(newest_buffer_archive(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn newest_buffer_archive_tolerates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-created");
        assert_eq!(newest_buffer_archive(&missing).await.unwrap(), None);
    }
}
