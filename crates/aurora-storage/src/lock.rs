// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{PACKAGES_DATABASE_FILE, StorageError};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, trace, warn};

/// Process-wide mutual exclusion for mutations of the repository database.
///
/// `repo-add` invocations against the same `aurora.db.tar` must not overlap
/// within a process; across processes the external tool's own `.lck` file
/// (checked at startup by [`ensure_unlocked`]) is the arbiter.
#[derive(Debug)]
pub struct RepoLock {
    dir: PathBuf,
    mutex: Mutex<()>,
}

impl RepoLock {
    /// A lock guarding the repository database under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mutex: Mutex::new(()),
        }
    }

    /// The repository directory this lock is associated with.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register `archive` in the repository database via `repo-add`,
    /// holding the lock for the duration of the external call.
    pub async fn repo_add(&self, archive: &Path) -> Result<(), StorageError> {
        let _guard = self.mutex.lock().await;

        let database = self.dir.join(PACKAGES_DATABASE_FILE);
        trace!(
            database = %database.display(),
            archive = %archive.display(),
            "invoking repo-add",
        );

        let output = Command::new("repo-add")
            .arg(&database)
            .arg(archive)
            .output()
            .await
            .map_err(|err| StorageError::Indexer {
                reason: format!("unable to spawn repo-add: {err}"),
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            trace!(target: "repo-add", "{line}");
        }

        if !output.status.success() {
            return Err(StorageError::Indexer {
                reason: format!(
                    "repo-add exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim(),
                ),
            });
        }

        Ok(())
    }
}

/// Verify the repository database is not locked by a live process.
///
/// Reads `<dir>/aurora.db.tar.lck`; a missing file is the good case. A
/// present file names the owning pid: if that process is gone the stale
/// lock is removed, otherwise startup must fail.
pub fn ensure_unlocked(dir: &Path) -> Result<(), StorageError> {
    let path = dir.join(format!("{PACKAGES_DATABASE_FILE}.lck"));

    info!(path = %path.display(), "checking repository database lock");

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("repository database lock does not exist, proceeding");
            return Ok(());
        }
        Err(source) => {
            return Err(StorageError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };

    warn!(path = %path.display(), "repository database lock exists");

    let pid: i32 = raw
        .trim()
        .parse()
        .map_err(|_| StorageError::LockContent {
            path: path.display().to_string(),
            content: raw.clone(),
        })?;

    // Signal 0 probes for existence without delivering anything.
    if kill(Pid::from_raw(pid), None).is_ok() {
        return Err(StorageError::LockHeld {
            pid,
            path: path.display().to_string(),
        });
    }

    warn!(pid, "lock owner is not running, removing stale lock");

    fs::remove_file(&path).map_err(|source| StorageError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_path(dir: &Path) -> PathBuf {
        dir.join(format!("{PACKAGES_DATABASE_FILE}.lck"))
    }

    #[test]
    fn missing_lock_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        ensure_unlocked(dir.path()).unwrap();
    }

    #[test]
    fn stale_lock_is_removed() {
        let dir = tempfile::tempdir().unwrap();

        // A freshly reaped child pid is as close to "definitely dead" as a
        // test can get.
        let pid = std::process::Command::new("true")
            .spawn()
            .and_then(|mut child| {
                let pid = child.id();
                child.wait().map(|_| pid)
            })
            .unwrap();

        fs::write(lock_path(dir.path()), format!("{pid}\n")).unwrap();
        ensure_unlocked(dir.path()).unwrap();
        assert!(!lock_path(dir.path()).exists());
    }

    #[test]
    fn live_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(lock_path(dir.path()), format!("{}\n", std::process::id())).unwrap();

        let err = ensure_unlocked(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::LockHeld { .. }));
        assert!(lock_path(dir.path()).exists());
    }

    #[test]
    fn garbage_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(lock_path(dir.path()), "not-a-pid").unwrap();

        let err = ensure_unlocked(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::LockContent { .. }));
    }
}
