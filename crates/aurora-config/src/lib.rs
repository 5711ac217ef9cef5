// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration for the Aurora daemons.
//!
//! Each daemon has its own TOML file (by default under `/etc/aurorad/`)
//! and its own config type here. Durations are written as integer seconds.
//! An `instance` left empty or set to `"$HOSTNAME"` resolves to the
//! machine's hostname.
#![deny(unsafe_code)]

use aurora_storage::History;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Failures loading a daemon configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("unable to read config file {path}")]
    Io {
        /// Requested path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this config type.
    #[error("unable to parse config file {path}: {reason}")]
    Parse {
        /// Requested path.
        path: String,
        /// Parser diagnostics.
        reason: String,
    },

    /// The hostname could not be determined for `$HOSTNAME` resolution.
    #[error("unable to resolve hostname for instance name")]
    Hostname(#[source] std::io::Error),
}

/// Shared logging switches, present in every daemon config.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable debug-level logging.
    #[serde(default)]
    pub debug: bool,
    /// Enable trace-level logging (implies debug).
    #[serde(default)]
    pub trace: bool,
}

/// Scheduler tick rate and per-status cooldowns.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Intervals {
    /// Seconds between catalog scans.
    #[serde(default = "defaults::poll", with = "duration_secs")]
    pub poll: Duration,
    /// Cooldown after a package entered `processing`.
    #[serde(default = "defaults::processing", with = "duration_secs")]
    pub status_processing: Duration,
    /// Cooldown after a successful build.
    #[serde(default = "defaults::success", with = "duration_secs")]
    pub status_success: Duration,
    /// Cooldown after a failed build.
    #[serde(default = "defaults::failure", with = "duration_secs")]
    pub status_failure: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            poll: defaults::poll(),
            status_processing: defaults::processing(),
            status_success: defaults::success(),
            status_failure: defaults::failure(),
        }
    }
}

/// Container CPU allotment.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Resources {
    /// CPUs per container; `0` disables pinning.
    #[serde(default)]
    pub cpu: usize,
}

/// `aurorad-rpcd` configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(flatten)]
    pub log: LogConfig,
    /// HTTP listen address, e.g. `:8080` style `0.0.0.0:8080`.
    pub listen: String,
    /// Catalog connection URI.
    pub database: String,
    /// Broker connection URI.
    pub bus: String,
    /// Directory of authorized public keys.
    pub authorized_keys: PathBuf,
    /// Directory of per-package build log snapshots.
    pub logs_dir: PathBuf,
    /// Identity reported for packages no builder has touched yet.
    #[serde(default)]
    pub instance: String,
    /// Port of the builders' live-log WebSocket servers.
    #[serde(default = "defaults::bus_port")]
    pub bus_port: u16,
}

/// `aurorad-queued` configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(flatten)]
    pub log: LogConfig,
    /// Scheduler instance identity (stuck-row recovery scope).
    #[serde(default)]
    pub instance: String,
    /// Catalog connection URI.
    pub database: String,
    /// Broker connection URI.
    pub bus: String,
    /// Poll rate and cooldowns.
    #[serde(default)]
    pub interval: Intervals,
}

/// `aurorad-procd` configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcConfig {
    #[serde(flatten)]
    pub log: LogConfig,
    /// Builder instance identity; also the host clients fetch archives from.
    #[serde(default)]
    pub instance: String,
    /// Broker connection URI.
    pub bus: String,
    /// Catalog connection URI.
    pub database: String,
    /// RPC facade address for pushing build events.
    pub rpc: String,
    /// Private key authenticating this builder to the RPC facade.
    pub key: PathBuf,
    /// Repository directory the static file server exposes.
    pub repo_dir: PathBuf,
    /// Per-package build log snapshots.
    pub logs_dir: PathBuf,
    /// Scratch space bind-mounted into build containers.
    pub buffer_dir: PathBuf,
    /// Worker pool size; `0` means one per CPU.
    #[serde(default)]
    pub threads: usize,
    /// Container image builds run in.
    pub base_image: String,
    /// Archive retention policy.
    pub history: History,
    /// Container CPU allotment.
    #[serde(default)]
    pub resources: Resources,
    /// Live-log WebSocket listen address.
    #[serde(default = "defaults::bus_listen")]
    pub listen: String,
    /// Hard deadline for the `run.sh` phase.
    #[serde(default = "defaults::build_timeout", with = "duration_secs")]
    pub build_timeout: Duration,
}

/// `aurorad-storaged` configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(flatten)]
    pub log: LogConfig,
    /// Indexer instance identity (names the private exchange binding).
    #[serde(default)]
    pub instance: String,
    /// Broker connection URI.
    pub bus: String,
    /// Local repository directory this indexer maintains.
    pub directory: PathBuf,
    /// Archive retention policy.
    pub history: History,
}

/// Load a daemon config from `path`.
pub fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Resolve a configured instance name.
///
/// Empty and `"$HOSTNAME"` both mean "this machine's hostname".
pub fn resolve_instance(configured: &str) -> Result<String, ConfigError> {
    if !configured.is_empty() && configured != "$HOSTNAME" {
        return Ok(configured.to_string());
    }

    let hostname = nix::unistd::gethostname()
        .map_err(|errno| ConfigError::Hostname(std::io::Error::from(errno)))?;

    Ok(hostname.to_string_lossy().into_owned())
}

mod defaults {
    use aurora_proto::DEFAULT_BUS_SERVER_PORT;
    use std::time::Duration;

    pub fn poll() -> Duration {
        Duration::from_secs(2)
    }

    pub fn processing() -> Duration {
        Duration::from_secs(30 * 60)
    }

    pub fn success() -> Duration {
        Duration::from_secs(30 * 60)
    }

    pub fn failure() -> Duration {
        Duration::from_secs(60 * 60)
    }

    pub fn bus_port() -> u16 {
        DEFAULT_BUS_SERVER_PORT
    }

    pub fn bus_listen() -> String {
        format!("0.0.0.0:{DEFAULT_BUS_SERVER_PORT}")
    }

    pub fn build_timeout() -> Duration {
        Duration::from_secs(30 * 60)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        val.as_secs().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let secs: u64 = u64::deserialize(de)?;
        Ok(Duration::from_secs(secs))
    }
}
