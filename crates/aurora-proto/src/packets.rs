// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request/response packets for the JSON-RPC facade.
//!
//! Every request that can act with an identity carries an optional
//! [`Signature`]; whether the signature is *required* is decided per method
//! by the service layer.

use crate::{Build, Package};
use aurora_signature::Signature;
use serde::{Deserialize, Serialize};

/// `AuthService.WhoAmI`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestWhoAmI {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// Reply to [`RequestWhoAmI`]; `name` is empty for anonymous callers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseWhoAmI {
    #[serde(default)]
    pub name: String,
}

/// `PackageService.ListPackages`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestListPackages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// Reply to [`RequestListPackages`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseListPackages {
    #[serde(default)]
    pub packages: Vec<Package>,
}

/// `PackageService.GetPackage`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestGetPackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    pub name: String,
}

/// Reply to [`RequestGetPackage`]; `package` is `null` when unknown.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseGetPackage {
    #[serde(default)]
    pub package: Option<Package>,
}

/// `PackageService.GetLogs`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestGetLogs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    pub name: String,
}

/// Reply to [`RequestGetLogs`]; empty when no logs were captured yet.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseGetLogs {
    #[serde(default)]
    pub logs: String,
}

/// `PackageService.GetBus`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestGetBus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    pub name: String,
}

/// Reply to [`RequestGetBus`]: the WebSocket URL of the live-log stream.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseGetBus {
    #[serde(default)]
    pub stream: String,
}

/// `PackageService.AddPackage`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestAddPackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
}

/// Reply to [`RequestAddPackage`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseAddPackage {}

/// `PackageService.RemovePackage`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestRemovePackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    pub name: String,
}

/// Reply to [`RequestRemovePackage`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseRemovePackage {}

/// `BuildService.PushBuild`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestPushBuild {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    pub build: Build,
}

/// Reply to [`RequestPushBuild`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponsePushBuild {}
