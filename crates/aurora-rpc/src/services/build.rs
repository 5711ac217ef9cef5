// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::services::{AuthService, ServiceError};
use async_trait::async_trait;
use aurora_bus::{BusError, Publisher};
use aurora_catalog::Catalog;
use aurora_proto::{Archive, PackageStatus, RequestPushBuild, ResponsePushBuild};
use std::sync::Arc;
use tracing::info;

/// Where successful-build notices are fanned out to.
///
/// The production sink is the `archives` exchange publisher; tests record
/// the notices instead.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Deliver one archive-ready notice.
    async fn publish_archive(&self, archive: &Archive) -> Result<(), BusError>;
}

#[async_trait]
impl ArchiveSink for Publisher {
    async fn publish_archive(&self, archive: &Archive) -> Result<(), BusError> {
        self.publish(archive).await
    }
}

/// Persists build events pushed by builders.
pub struct BuildService {
    catalog: Catalog,
    auth: Arc<AuthService>,
    archives: Arc<dyn ArchiveSink>,
}

impl BuildService {
    /// Wire the service to its collaborators.
    pub fn new(catalog: Catalog, auth: Arc<AuthService>, archives: Arc<dyn ArchiveSink>) -> Self {
        Self {
            catalog,
            auth,
            archives,
        }
    }

    /// `BuildService.PushBuild` — privileged.
    ///
    /// The event's `instance` is overwritten with the verified signer name
    /// before anything is persisted; a client-declared instance is never
    /// trusted. Rows are upserted on `(instance, package)`, and a
    /// successful build with an archive attached is fanned out to the
    /// indexers.
    pub async fn push_build(
        &self,
        request: &RequestPushBuild,
    ) -> Result<ResponsePushBuild, ServiceError> {
        let Some(signer) = self.auth.verify(request.signature.as_ref()) else {
            return Err(ServiceError::Unauthorized);
        };

        let mut build = request.build.clone();
        build.instance = signer.to_string();
        build.validate()?;

        self.catalog.upsert_build(&build).await?;

        info!(
            package = %build.package,
            status = %build.status,
            instance = %build.instance,
            "build recorded",
        );

        if build.status == PackageStatus::Success {
            if let Some(archive) = build.archive.as_deref().filter(|a| !a.is_empty()) {
                self.archives
                    .publish_archive(&Archive {
                        instance: build.instance.clone(),
                        package: build.package.clone(),
                        archive: archive.to_string(),
                    })
                    .await?;
            }
        }

        Ok(ResponsePushBuild {})
    }
}
