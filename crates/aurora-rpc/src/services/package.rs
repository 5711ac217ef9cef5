// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::services::{AuthService, ServiceError};
use aurora_catalog::{Catalog, CatalogError};
use aurora_proto::{
    Package, RequestAddPackage, RequestGetBus, RequestGetLogs, RequestGetPackage,
    RequestListPackages, RequestRemovePackage, ResponseAddPackage, ResponseGetBus,
    ResponseGetLogs, ResponseGetPackage, ResponseListPackages, ResponseRemovePackage,
    is_valid_package_name,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Catalog queries and mutations exposed to clients.
pub struct PackageService {
    catalog: Catalog,
    auth: Arc<AuthService>,
    logs_dir: PathBuf,
    instance: String,
    bus_port: u16,
}

impl PackageService {
    /// Wire the service to its collaborators.
    ///
    /// `instance` and `bus_port` shape the stream URLs handed out by
    /// `GetBus`; `logs_dir` is where builders snapshot container output.
    pub fn new(
        catalog: Catalog,
        auth: Arc<AuthService>,
        logs_dir: PathBuf,
        instance: String,
        bus_port: u16,
    ) -> Self {
        Self {
            catalog,
            auth,
            logs_dir,
            instance,
            bus_port,
        }
    }

    /// `PackageService.ListPackages` — open read.
    pub async fn list_packages(
        &self,
        _request: &RequestListPackages,
    ) -> Result<ResponseListPackages, ServiceError> {
        Ok(ResponseListPackages {
            packages: self.catalog.list().await?,
        })
    }

    /// `PackageService.GetPackage` — open read; `null` for a missing name.
    pub async fn get_package(
        &self,
        request: &RequestGetPackage,
    ) -> Result<ResponseGetPackage, ServiceError> {
        Ok(ResponseGetPackage {
            package: self.catalog.find_one(&request.name).await?,
        })
    }

    /// `PackageService.GetLogs` — the last container's combined output, or
    /// an empty string when nothing was captured yet.
    pub async fn get_logs(
        &self,
        request: &RequestGetLogs,
    ) -> Result<ResponseGetLogs, ServiceError> {
        if !is_valid_package_name(&request.name) {
            return Err(ServiceError::InvalidName);
        }

        let path = self.logs_dir.join(&request.name);
        let logs = match tokio::fs::read_to_string(&path).await {
            Ok(logs) => logs,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(ServiceError::Logs(err)),
        };

        Ok(ResponseGetLogs { logs })
    }

    /// `PackageService.GetBus` — the WebSocket URL of the live-log stream,
    /// pointing at the worker that last processed the package.
    pub async fn get_bus(&self, request: &RequestGetBus) -> Result<ResponseGetBus, ServiceError> {
        let package = self
            .catalog
            .find_one(&request.name)
            .await?
            .ok_or(ServiceError::NotFound)?;

        let instance = if package.instance.is_empty() {
            self.instance.as_str()
        } else {
            package.instance.as_str()
        };

        Ok(ResponseGetBus {
            stream: format!(
                "ws://{instance}:{port}/?package={name}",
                port = self.bus_port,
                name = request.name,
            ),
        })
    }

    /// `PackageService.AddPackage` — public enqueue; adding a package that
    /// already exists is success.
    pub async fn add_package(
        &self,
        request: &RequestAddPackage,
    ) -> Result<ResponseAddPackage, ServiceError> {
        if !is_valid_package_name(&request.name) {
            return Err(ServiceError::InvalidName);
        }

        let package = Package {
            clone_url: request.clone_url.clone(),
            subdir: request.subdir.clone(),
            ..Package::queued(&request.name)
        };

        match self.catalog.insert(&package).await {
            Ok(()) => {
                info!(package = %request.name, "package queued");
                Ok(ResponseAddPackage {})
            }
            Err(CatalogError::Duplicate) => Ok(ResponseAddPackage {}),
            Err(err) => Err(err.into()),
        }
    }

    /// `PackageService.RemovePackage` — privileged.
    pub async fn remove_package(
        &self,
        request: &RequestRemovePackage,
    ) -> Result<ResponseRemovePackage, ServiceError> {
        let Some(signer) = self.auth.verify(request.signature.as_ref()) else {
            return Err(ServiceError::Unauthorized);
        };

        self.catalog.remove(&request.name).await?;

        info!(package = %request.name, signer, "package removed");

        Ok(ResponseRemovePackage {})
    }
}
