// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a catalog package.
///
/// Within one build cycle the status advances
/// `queued → processing → (success | failure)`; `unknown` is the state a
/// crashed builder leaves behind, reset at scheduler startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// Freshly added, never picked up by a builder.
    Queued,
    /// A builder is currently working on the package.
    Processing,
    /// The last build produced and indexed an archive.
    Success,
    /// The last build failed.
    Failure,
    /// State could not be determined (orphaned by a crash).
    #[default]
    Unknown,
}

impl PackageStatus {
    /// Returns `true` for the states that end a build cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// The stable wire name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown package status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&PackageStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&PackageStatus::Queued).unwrap(),
            "\"queued\""
        );
    }

    #[test]
    fn roundtrips_through_str() {
        for status in [
            PackageStatus::Queued,
            PackageStatus::Processing,
            PackageStatus::Success,
            PackageStatus::Failure,
            PackageStatus::Unknown,
        ] {
            assert_eq!(status.as_str().parse::<PackageStatus>().unwrap(), status);
        }
    }

    #[test]
    fn only_success_and_failure_are_terminal() {
        assert!(PackageStatus::Success.is_terminal());
        assert!(PackageStatus::Failure.is_terminal());
        assert!(!PackageStatus::Queued.is_terminal());
        assert!(!PackageStatus::Processing.is_terminal());
        assert!(!PackageStatus::Unknown.is_terminal());
    }
}
