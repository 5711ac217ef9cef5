// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::PackageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry, keyed by its unique `name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Unique package name; see [`crate::is_valid_package_name`].
    pub name: String,

    /// Git URL for non-AUR sources; when absent the builder clones from AUR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,

    /// Subdirectory of the clone that holds the PKGBUILD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,

    /// Version produced by the last successful pkgver run.
    #[serde(default)]
    pub version: String,

    /// Current lifecycle state.
    #[serde(default)]
    pub status: PackageStatus,

    /// Identity of the last builder that touched this package.
    #[serde(default)]
    pub instance: String,

    /// When the status last changed; drives the scheduler cooldowns.
    pub updated_at: DateTime<Utc>,

    /// Scheduling bias, higher first.
    #[serde(default)]
    pub priority: i64,

    /// Consecutive failure counter, reset on success.
    #[serde(default)]
    pub failures: i64,

    /// Wall-clock seconds the last `/app/run.sh` phase took.
    #[serde(default)]
    pub build_time: f64,

    /// Wall-clock seconds the last `/app/pkgver.sh` phase took.
    #[serde(default)]
    pub pkgver_time: f64,
}

impl Package {
    /// A fresh catalog entry in the `queued` state.
    pub fn queued(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_url: None,
            subdir: None,
            version: String::new(),
            status: PackageStatus::Queued,
            instance: String::new(),
            updated_at: Utc::now(),
            priority: 0,
            failures: 0,
            build_time: 0.0,
            pkgver_time: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_package_has_expected_defaults() {
        let pkg = Package::queued("binutils-git");
        assert_eq!(pkg.name, "binutils-git");
        assert_eq!(pkg.status, PackageStatus::Queued);
        assert_eq!(pkg.priority, 0);
        assert_eq!(pkg.failures, 0);
        assert!(pkg.clone_url.is_none());
    }

    #[test]
    fn optional_source_fields_are_omitted_from_json() {
        let json = serde_json::to_value(Package::queued("aa")).unwrap();
        assert!(json.get("clone_url").is_none());
        assert!(json.get("subdir").is_none());
        assert_eq!(json["status"], "queued");
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let pkg: Package = serde_json::from_str(
            r#"{"name":"aa","updated_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(pkg.status, PackageStatus::Unknown);
        assert_eq!(pkg.version, "");
    }
}
