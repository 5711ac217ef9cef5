// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{PackageStatus, is_valid_package_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single build attempt, as published by a builder and persisted per
/// `(instance, package)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Build {
    /// Package the attempt was for.
    pub package: String,

    /// Outcome (or, for intermediate events, the current phase).
    pub status: PackageStatus,

    /// Failure description; present exactly when `status` is `failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Builder identity, stamped server-side from the verified signer.
    #[serde(default)]
    pub instance: String,

    /// Produced archive basename; present exactly when `status` is `success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,

    /// When the event was produced.
    pub at: DateTime<Utc>,
}

impl Build {
    /// An event for `package` in the given status, stamped `now`.
    ///
    /// The `instance` is left empty; the RPC facade fills it in from the
    /// authenticated signer.
    pub fn new(package: impl Into<String>, status: PackageStatus) -> Self {
        Self {
            package: package.into(),
            status,
            error: None,
            instance: String::new(),
            archive: None,
            at: Utc::now(),
        }
    }

    /// Check the conditional-field invariants.
    ///
    /// `error` must be non-empty iff the build failed, `archive` non-empty
    /// iff it succeeded, and the package name must be well-formed.
    pub fn validate(&self) -> Result<(), BuildValidateError> {
        if !is_valid_package_name(&self.package) {
            return Err(BuildValidateError::InvalidName {
                name: self.package.clone(),
            });
        }

        let failed = self.status == PackageStatus::Failure;
        let has_error = self.error.as_deref().is_some_and(|e| !e.is_empty());
        if failed != has_error {
            return Err(BuildValidateError::ErrorMismatch {
                status: self.status,
            });
        }

        let succeeded = self.status == PackageStatus::Success;
        let has_archive = self.archive.as_deref().is_some_and(|a| !a.is_empty());
        if succeeded != has_archive {
            return Err(BuildValidateError::ArchiveMismatch {
                status: self.status,
            });
        }

        Ok(())
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "package={:?} status={:?} error={:?} instance={:?} archive={:?} at={}",
            self.package,
            self.status.as_str(),
            self.error,
            self.instance,
            self.archive,
            self.at.to_rfc3339(),
        )
    }
}

/// Violation of the [`Build`] field invariants.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildValidateError {
    /// The package name does not match the name grammar.
    #[error("invalid package name: {name:?}")]
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// `error` presence disagrees with the status.
    #[error("build in status {status} must carry an error exactly when failed")]
    ErrorMismatch {
        /// Status the event carried.
        status: PackageStatus,
    },

    /// `archive` presence disagrees with the status.
    #[error("build in status {status} must carry an archive exactly when successful")]
    ArchiveMismatch {
        /// Status the event carried.
        status: PackageStatus,
    },
}

/// Fan-out notice that a worker published a freshly built archive.
///
/// Every archive indexer receives every notice and mirrors the file from the
/// producing worker's static file server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    /// Worker that produced (and serves) the archive.
    pub instance: String,
    /// Package the archive belongs to.
    pub package: String,
    /// Archive filename relative to the worker's HTTP root.
    pub archive: String,
}
