// SPDX-License-Identifier: MIT OR Apache-2.0
//! The container runtime behind the builder.
//!
//! Wraps the Docker Engine API: one [`Cloud`] per builder process creates,
//! drives, and destroys the per-build containers, and owns the round-robin
//! CPU-pinning cursor.

use anyhow::{Context, Result, anyhow, bail};
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::service::HostConfig;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Label stamped on every container we create; the value is the builder
/// version, the key is what startup cleanup filters on.
pub const IMAGE_LABEL_KEY: &str = "io.reconquest/aurora";

/// A builder's handle to the container runtime.
pub struct Cloud {
    client: Docker,
    base_image: String,
    cpu_width: usize,
    threads: usize,
    cpu_cursor: AtomicUsize,
}

impl Cloud {
    /// Connect to the local Docker daemon.
    ///
    /// `cpu_width` CPUs are pinned per container (`0` disables pinning),
    /// round-robining across `threads` cores.
    pub fn new(base_image: impl Into<String>, cpu_width: usize, threads: usize) -> Result<Self> {
        let client =
            Docker::connect_with_local_defaults().context("unable to connect to docker")?;

        Ok(Self {
            client,
            base_image: base_image.into(),
            cpu_width,
            threads,
            cpu_cursor: AtomicUsize::new(0),
        })
    }

    /// The CPU set for the next container: `""` (no pinning), `"0"`, or a
    /// range like `"0-1"`, advancing round-robin modulo `threads`.
    pub fn next_cpuset(&self) -> String {
        if self.cpu_width == 0 {
            return String::new();
        }

        let threads = self.threads.max(1);
        let slot = self.cpu_cursor.fetch_add(1, Ordering::Relaxed);
        let start = (slot * self.cpu_width) % threads;

        if self.cpu_width == 1 {
            start.to_string()
        } else {
            format!("{start}-{end}", end = start + self.cpu_width - 1)
        }
    }

    /// Create the build container for `package`.
    pub async fn create_container(
        &self,
        buffer_dir: &Path,
        container_name: &str,
        package: &str,
        clone_url: Option<&str>,
        subdir: Option<&str>,
    ) -> Result<String> {
        let mut env = vec![format!("AURORA_PACKAGE={package}")];
        if let Some(clone_url) = clone_url {
            env.push(format!("AURORA_CLONE_URL={clone_url}"));
        }
        if let Some(subdir) = subdir {
            env.push(format!("AURORA_SUBDIR={subdir}"));
        }

        let cpuset = self.next_cpuset();
        let host_config = HostConfig {
            binds: Some(vec![format!("{}:/buffer", buffer_dir.display())]),
            cpuset_cpus: (!cpuset.is_empty()).then_some(cpuset),
            ..HostConfig::default()
        };

        let config = Config {
            image: Some(self.base_image.clone()),
            labels: Some(HashMap::from([(
                IMAGE_LABEL_KEY.to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            )])),
            tty: Some(true),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Config::default()
        };

        let created = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
            .context("unable to create container")?;

        Ok(created.id)
    }

    /// Start a created container.
    pub async fn start_container(&self, container: &str) -> Result<()> {
        self.client
            .start_container(container, None::<StartContainerOptions<String>>)
            .await
            .context("unable to start container")?;
        Ok(())
    }

    /// Run `command` inside the container, feeding each output line to
    /// `on_line`, under a hard `deadline`.
    ///
    /// A deadline expiry or a non-zero exit status is an error; both are
    /// recorded as build failures by the caller.
    pub async fn exec(
        &self,
        container: &str,
        command: &[&str],
        deadline: Duration,
        mut on_line: impl FnMut(&str),
    ) -> Result<()> {
        let exec = self
            .client
            .create_exec(
                container,
                CreateExecOptions::<String> {
                    cmd: Some(command.iter().map(|arg| arg.to_string()).collect()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..CreateExecOptions::default()
                },
            )
            .await
            .context("unable to create exec")?;

        let results = self
            .client
            .start_exec(&exec.id, None)
            .await
            .context("unable to start exec")?;

        let StartExecResults::Attached { mut output, .. } = results else {
            bail!("exec started detached, expected attached output");
        };

        let drained = tokio::time::timeout(deadline, async {
            let mut pending = String::new();

            while let Some(chunk) = output.next().await {
                let chunk = chunk.context("unable to read exec output")?;
                push_lines(&mut pending, &chunk, &mut on_line);
            }

            if !pending.is_empty() {
                on_line(&pending);
            }

            Ok::<(), anyhow::Error>(())
        })
        .await;

        match drained {
            Ok(result) => result?,
            Err(_) => bail!("command {command:?} exceeded deadline of {deadline:?}"),
        }

        let inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .context("unable to inspect exec")?;

        match inspect.exit_code {
            Some(0) | None => Ok(()),
            Some(code) => bail!("command {command:?} exited with code {code}"),
        }
    }

    /// Aggregate anything abnormal about the container's final state into
    /// an error: non-zero exit code, runtime error string, OOM kill.
    pub async fn state_error(&self, container: &str) -> Result<()> {
        let inspect = self
            .client
            .inspect_container(container, None)
            .await
            .context("unable to inspect container")?;

        let Some(state) = inspect.state else {
            return Ok(());
        };

        let mut problems = Vec::new();
        if let Some(code) = state.exit_code.filter(|&code| code != 0) {
            problems.push(format!("exit code: {code}"));
        }
        if let Some(error) = state.error.filter(|error| !error.is_empty()) {
            problems.push(format!("error: {error}"));
        }
        if state.oom_killed == Some(true) {
            problems.push("killed by oom".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{}", problems.join("; ")))
        }
    }

    /// Snapshot the container's combined stdout/stderr to
    /// `<logs_dir>/<package>`, replacing any previous snapshot.
    pub async fn write_logs(
        &self,
        logs_dir: &Path,
        container: &str,
        package: &str,
    ) -> Result<()> {
        let mut logs = self.client.logs(
            container,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: "all".into(),
                ..LogsOptions::default()
            }),
        );

        let mut contents = Vec::new();
        while let Some(chunk) = logs.next().await {
            let chunk: LogOutput = chunk.context("unable to read container logs")?;
            contents.extend_from_slice(&chunk.into_bytes());
        }

        let path = logs_dir.join(package);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("unable to write logs to {}", path.display()))?;

        Ok(())
    }

    /// Force-remove a container.
    pub async fn destroy_container(&self, container: &str) -> Result<()> {
        self.client
            .remove_container(
                container,
                Some(RemoveContainerOptions {
                    force: true,
                    ..RemoveContainerOptions::default()
                }),
            )
            .await
            .context("unable to remove container")?;
        Ok(())
    }

    /// Destroy every container carrying our label, regardless of state.
    ///
    /// Run before serving: whatever is still around belongs to a previous
    /// life of this builder.
    pub async fn cleanup(&self) -> Result<()> {
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters: HashMap::from([(
                    "label".to_string(),
                    vec![IMAGE_LABEL_KEY.to_string()],
                )]),
                ..ListContainersOptions::default()
            }))
            .await
            .context("unable to list containers")?;

        let mut destroyed = 0;
        for container in containers {
            let Some(id) = container.id else {
                continue;
            };

            info!(
                id = %id,
                names = ?container.names,
                status = ?container.status,
                "cleanup: destroying container",
            );

            self.destroy_container(&id)
                .await
                .with_context(|| format!("unable to destroy container {id}"))?;
            destroyed += 1;
        }

        info!(destroyed, "cleanup: leftover containers destroyed");

        Ok(())
    }
}

fn push_lines(pending: &mut String, chunk: &LogOutput, on_line: &mut impl FnMut(&str)) {
    pending.push_str(&String::from_utf8_lossy(&chunk.clone().into_bytes()));

    while let Some(position) = pending.find('\n') {
        let line: String = pending.drain(..=position).collect();
        on_line(line.trim_end_matches(['\n', '\r', ' ', '\t']));
    }
}
