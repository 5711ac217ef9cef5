// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared data model for the Aurora build farm.
//!
//! Everything that crosses a process boundary lives here: the catalog
//! [`Package`] row, the [`Build`] event, the [`Archive`] fan-out notice, and
//! the JSON-RPC request/response packets exchanged between the `aurora`
//! client, the daemons, and each other.
#![deny(unsafe_code)]

mod build;
mod package;
mod packets;
mod status;
mod validate;

pub use build::{Archive, Build, BuildValidateError};
pub use package::Package;
pub use packets::*;
pub use status::PackageStatus;
pub use validate::is_valid_package_name;

/// Port every builder serves its live-log WebSocket endpoint on.
pub const DEFAULT_BUS_SERVER_PORT: u16 = 4242;
