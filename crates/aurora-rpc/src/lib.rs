// SPDX-License-Identifier: MIT OR Apache-2.0
//! The authenticated JSON-RPC surface of the Aurora build farm.
//!
//! The server side is an axum `POST /rpc/` handler dispatching over an
//! explicit `"Service.Method"` table (see [`methods`]) to the three
//! services: [`AuthService`], [`PackageService`], and [`BuildService`].
//! The client side is a small reqwest wrapper used by the `aurora` CLI and
//! the builders.
#![deny(unsafe_code)]

mod client;
mod server;
mod services;
mod wire;

pub use client::{ClientError, RpcClient};
pub use server::{RpcServer, router};
pub use services::{ArchiveSink, AuthService, BuildService, PackageService, ServiceError};
pub use wire::{RpcErrorObject, RpcRequest, RpcResponse, error_codes};

/// The complete method table; requests with any other name fail with
/// "method not found".
pub mod methods {
    /// `AuthService.WhoAmI`
    pub const WHO_AM_I: &str = "AuthService.WhoAmI";
    /// `PackageService.ListPackages`
    pub const LIST_PACKAGES: &str = "PackageService.ListPackages";
    /// `PackageService.GetPackage`
    pub const GET_PACKAGE: &str = "PackageService.GetPackage";
    /// `PackageService.GetLogs`
    pub const GET_LOGS: &str = "PackageService.GetLogs";
    /// `PackageService.GetBus`
    pub const GET_BUS: &str = "PackageService.GetBus";
    /// `PackageService.AddPackage`
    pub const ADD_PACKAGE: &str = "PackageService.AddPackage";
    /// `PackageService.RemovePackage`
    pub const REMOVE_PACKAGE: &str = "PackageService.RemovePackage";
    /// `BuildService.PushBuild`
    pub const PUSH_BUILD: &str = "BuildService.PushBuild";
}
