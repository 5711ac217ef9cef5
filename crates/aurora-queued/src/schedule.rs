// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::{Context, Result};
use aurora_bus::Publisher;
use aurora_catalog::Catalog;
use aurora_config::Intervals;
use aurora_proto::{Build, Package, PackageStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, trace};

/// The scheduler loop: one catalog sweep per poll interval, forever.
///
/// Catalog trouble is logged and retried next tick (the reconnect watcher
/// covers the gap); a publish failure means the broker is gone and is
/// fatal.
pub async fn enqueue_builds(
    catalog: &Catalog,
    builds: &Publisher,
    intervals: &Intervals,
) -> Result<()> {
    loop {
        if let Err(err) = sweep(catalog, builds, intervals).await {
            error!(error = %err, "catalog sweep failed, retrying next tick");
        }

        tokio::time::sleep(intervals.poll).await;
    }
}

async fn sweep(catalog: &Catalog, builds: &Publisher, intervals: &Intervals) -> Result<()> {
    let mut cursor = catalog
        .iterate_priority()
        .await
        .context("unable to open priority cursor")?;

    while let Some(package) = cursor.next().await.context("unable to advance cursor")? {
        if let Some(cooldown) = active_cooldown(&package, intervals, Utc::now()) {
            trace!(
                package = %package.name,
                status = %package.status,
                remaining = ?cooldown,
                "skip: cooldown has not elapsed",
            );
            continue;
        }

        debug!(package = %package.name, "push");

        builds
            .publish(&Build::new(&package.name, PackageStatus::Queued))
            .await
            .context("unable to publish build request")?;
    }

    Ok(())
}

/// The remaining cooldown for `package`, or `None` when it is due.
///
/// Only `processing`, `success` and `failure` carry cooldowns; `queued`
/// and `unknown` packages are always due.
fn active_cooldown(package: &Package, intervals: &Intervals, now: DateTime<Utc>) -> Option<Duration> {
    let cooldown = match package.status {
        PackageStatus::Processing => intervals.status_processing,
        PackageStatus::Success => intervals.status_success,
        PackageStatus::Failure => intervals.status_failure,
        PackageStatus::Queued | PackageStatus::Unknown => return None,
    };

    let since = now
        .signed_duration_since(package.updated_at)
        .to_std()
        .unwrap_or(Duration::ZERO);

    (since < cooldown).then(|| cooldown - since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn package(status: PackageStatus, updated_secs_ago: i64) -> Package {
        Package {
            status,
            updated_at: Utc::now() - TimeDelta::seconds(updated_secs_ago),
            ..Package::queued("aa")
        }
    }

    fn intervals() -> Intervals {
        Intervals::default()
    }

    #[test]
    fn queued_and_unknown_are_always_due() {
        let now = Utc::now();
        assert!(active_cooldown(&package(PackageStatus::Queued, 0), &intervals(), now).is_none());
        assert!(active_cooldown(&package(PackageStatus::Unknown, 0), &intervals(), now).is_none());
    }

    #[test]
    fn fresh_success_is_cooling_down() {
        let now = Utc::now();
        let pkg = package(PackageStatus::Success, 60);
        assert!(active_cooldown(&pkg, &intervals(), now).is_some());
    }

    #[test]
    fn stale_success_is_due() {
        let now = Utc::now();
        let pkg = package(PackageStatus::Success, 31 * 60);
        assert!(active_cooldown(&pkg, &intervals(), now).is_none());
    }

    #[test]
    fn failure_cooldown_is_longer_than_success() {
        let now = Utc::now();
        // 45 minutes: past the success cooldown, inside the failure one.
        assert!(active_cooldown(&package(PackageStatus::Success, 45 * 60), &intervals(), now).is_none());
        assert!(active_cooldown(&package(PackageStatus::Failure, 45 * 60), &intervals(), now).is_some());
    }

    #[test]
    fn processing_cooldown_guards_against_double_dispatch() {
        let now = Utc::now();
        assert!(active_cooldown(&package(PackageStatus::Processing, 60), &intervals(), now).is_some());
        assert!(
            active_cooldown(&package(PackageStatus::Processing, 31 * 60), &intervals(), now)
                .is_none()
        );
    }

    #[test]
    fn future_updated_at_still_cools_down() {
        // Clock skew between daemons must not make a package permanently due.
        let now = Utc::now();
        let pkg = package(PackageStatus::Success, -120);
        assert!(active_cooldown(&pkg, &intervals(), now).is_some());
    }
}
