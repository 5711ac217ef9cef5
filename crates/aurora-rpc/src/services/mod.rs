// SPDX-License-Identifier: MIT OR Apache-2.0

mod auth;
mod build;
mod package;

pub use auth::AuthService;
pub use build::{ArchiveSink, BuildService};
pub use package::PackageService;

use aurora_catalog::CatalogError;
use aurora_proto::BuildValidateError;

/// Failures surfaced by the RPC services; each maps to a JSON-RPC error
/// object with its display text as the message.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A privileged method was called without a verified signature.
    #[error("you are not authorized to perform this action")]
    Unauthorized,

    /// The package name does not match the name grammar.
    #[error("invalid package name")]
    InvalidName,

    /// The named package does not exist.
    #[error("no such package")]
    NotFound,

    /// A pushed build violates its field invariants.
    #[error("invalid build: {0}")]
    InvalidBuild(#[from] BuildValidateError),

    /// The catalog rejected or dropped the operation.
    #[error("catalog error: {0}")]
    Catalog(CatalogError),

    /// The archive notice could not be fanned out.
    #[error("bus error: {0}")]
    Bus(#[from] aurora_bus::BusError),

    /// Reading a log snapshot failed.
    #[error("unable to read logs: {0}")]
    Logs(std::io::Error),
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => Self::NotFound,
            other => Self::Catalog(other),
        }
    }
}
