//! The reconciliation pass pipeline: snapshot, optional postponement,
//! expiry filter, rate-limited batch delete. Exercised in tests against
//! in-memory fakes of the cluster/release traits — no live cluster required.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::{ClusterClient, NamespaceStore, NamespaceView, ReleaseClient};
use crate::config::Config;
use crate::timefmt::{format_timestamp, parse_timestamp};
use crate::watcher::is_managed;

/// Extra margin added on top of the cache resync period before re-listing
/// after a postponement write, so the just-written annotation has landed.
const RESYNC_MARGIN: Duration = Duration::from_secs(35);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub expired: usize,
    pub postponed: Vec<String>,
    pub deleted: Vec<String>,
    pub skipped_unparsable: Vec<String>,
    pub failed: Vec<String>,
}

/// Sleeps for `duration` unless `shutdown` fires first. Returns true if
/// cancellation won the race — the caller must not begin new work.
async fn cancellable_sleep(duration: Duration, shutdown: &CancellationToken) -> bool {
    if duration.is_zero() {
        return shutdown.is_cancelled();
    }
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

pub async fn run_pass(
    store: &dyn NamespaceStore,
    cluster: &dyn ClusterClient,
    releases: &dyn ReleaseClient,
    config: &Config,
    now: DateTime<Utc>,
    shutdown: &CancellationToken,
) -> PassReport {
    let mut report = PassReport::default();

    let snapshot = managed_snapshot(store, config);
    if snapshot.is_empty() {
        return report;
    }

    if config.postpone_deletion_if_active {
        report.postponed = postpone_pass(cluster, releases, config, &snapshot).await;
        if !report.postponed.is_empty() && cancellable_sleep(RESYNC_MARGIN, shutdown).await {
            return report;
        }
    }

    if shutdown.is_cancelled() {
        return report;
    }

    let snapshot = if report.postponed.is_empty() {
        snapshot
    } else {
        managed_snapshot(store, config)
    };

    let mut expired: Vec<String> = Vec::new();
    for ns in &snapshot {
        let Some(raw) = ns.annotations.get(&config.annotation_key) else {
            continue;
        };
        match parse_timestamp(raw) {
            Ok(deadline) if deadline < now => expired.push(ns.name.clone()),
            Ok(_) => {}
            Err(_) => {
                warn!(namespace = %ns.name, value = %raw, "unparsable deadline annotation, skipping");
                report.skipped_unparsable.push(ns.name.clone());
            }
        }
    }
    expired.sort();
    report.expired = expired.len();

    if expired.is_empty() {
        return report;
    }

    let batch_size = if config.deletion_batch_size == 0 {
        expired.len()
    } else {
        config.deletion_batch_size
    };

    let batches: Vec<&[String]> = expired.chunks(batch_size).collect();
    let last_batch = batches.len().saturating_sub(1);

    for (i, batch) in batches.into_iter().enumerate() {
        if shutdown.is_cancelled() {
            break;
        }
        for name in batch {
            match delete_one(cluster, releases, config, name).await {
                Ok(()) => {
                    info!(namespace = %name, "namespace reaped");
                    report.deleted.push(name.clone());
                }
                Err(e) => {
                    warn!(namespace = %name, error = %e, "delete failed, aborting batch");
                    report.failed.push(name.clone());
                    return report;
                }
            }
        }
        if i != last_batch
            && config.deletion_nap > Duration::ZERO
            && cancellable_sleep(config.deletion_nap, shutdown).await
        {
            break;
        }
    }

    report
}

fn managed_snapshot(store: &dyn NamespaceStore, config: &Config) -> Vec<NamespaceView> {
    store
        .list()
        .into_iter()
        .filter(|ns| is_managed(config, &ns.name, &ns.annotations))
        .collect()
}

async fn postpone_pass(
    cluster: &dyn ClusterClient,
    releases: &dyn ReleaseClient,
    config: &Config,
    snapshot: &[NamespaceView],
) -> Vec<String> {
    let mut postponed = Vec::new();
    for ns in snapshot {
        let release_list = match releases.list_releases(&ns.name).await {
            Ok(r) => r,
            Err(e) => {
                warn!(namespace = %ns.name, error = %e, "failed to list releases for postponement");
                continue;
            }
        };
        let Some(latest) = release_list.iter().map(|r| r.last_deployed).max() else {
            continue;
        };
        let candidate =
            truncate_to_seconds(latest + chrono::Duration::from_std(config.retention).unwrap_or_default());
        let current = ns
            .annotations
            .get(&config.annotation_key)
            .and_then(|raw| parse_timestamp(raw).ok())
            .map(truncate_to_seconds);

        let should_write = match current {
            None => true,
            Some(c) => c < candidate,
        };
        if !should_write {
            continue;
        }

        let mut patch = BTreeMap::new();
        patch.insert(config.annotation_key.clone(), format_timestamp(candidate));
        match cluster.patch_annotations(&ns.name, patch).await {
            Ok(()) => postponed.push(ns.name.clone()),
            Err(e) => warn!(namespace = %ns.name, error = %e, "failed to postpone deadline"),
        }
    }
    postponed
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt - chrono::Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64)
}

async fn delete_one(
    cluster: &dyn ClusterClient,
    releases: &dyn ReleaseClient,
    config: &Config,
    name: &str,
) -> crate::error::Result<()> {
    if config.uninstall_releases {
        if config.dry_run {
            info!(namespace = %name, "[dry run] would uninstall releases");
        } else {
            let release_list = releases.list_releases(name).await.unwrap_or_default();
            let uninstalls = release_list.iter().map(|r| {
                let release_name = r.name.clone();
                let namespace = name.to_string();
                async move {
                    match releases.uninstall(&namespace, &release_name).await {
                        Ok(()) => info!(namespace = %namespace, release = %release_name, "release uninstalled"),
                        Err(e) => warn!(namespace = %namespace, release = %release_name, error = %e, "release uninstall failed"),
                    }
                }
            });
            join_all(uninstalls).await;
        }
    }

    if config.dry_run {
        info!(namespace = %name, "[dry run] would delete namespace");
        return Ok(());
    }

    cluster.delete_namespace(name).await
}
