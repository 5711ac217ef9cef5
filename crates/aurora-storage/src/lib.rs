// SPDX-License-Identifier: MIT OR Apache-2.0
//! Repository directory maintenance for the Aurora build farm.
//!
//! The repository directory is shared between a builder (or indexer) and the
//! static file server that distributes archives. This crate owns everything
//! that touches it: the archive filename grammar, the retention sweep that
//! prunes old versions, the `repo-add` invocation that keeps the pacman
//! database in sync, and the `.lck` liveness check performed at startup.
#![deny(unsafe_code)]

mod archive;
mod lock;

pub use archive::{ArchiveName, History, cleanup_repository_directory, newest_archive};
pub use lock::{RepoLock, ensure_unlocked};

/// Basename of the pacman repository database maintained by `repo-add`.
pub const PACKAGES_DATABASE_FILE: &str = "aurora.db.tar";

/// Failures while maintaining the repository directory.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("i/o error on {path}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The repository database lock is held by a live process.
    #[error("process {pid} that locked {path} is still running")]
    LockHeld {
        /// Owner recorded in the lock file.
        pid: i32,
        /// Lock file path.
        path: String,
    },

    /// The lock file exists but does not contain a pid.
    #[error("unexpected content in lock file {path}: {content:?}")]
    LockContent {
        /// Lock file path.
        path: String,
        /// What it contained instead.
        content: String,
    },

    /// The external indexer could not be spawned or exited non-zero.
    #[error("repo-add failed: {reason}")]
    Indexer {
        /// Exit status or spawn error description.
        reason: String,
    },
}
