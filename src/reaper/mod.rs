//! The outer reconciliation scheduler: ticks, gates on the maintenance
//! window, and runs at most one [`pass::run_pass`] at a time.

pub mod pass;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::{ClusterClient, NamespaceStore, ReleaseClient};
use crate::config::Config;
use crate::window;

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_NAP: Duration = Duration::from_secs(15 * 60);

pub async fn run(
    store: Arc<dyn NamespaceStore>,
    cluster: Arc<dyn ClusterClient>,
    releases: Arc<dyn ReleaseClient>,
    config: Arc<Config>,
    shutdown: CancellationToken,
) {
    let in_progress = AtomicBool::new(false);
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("reaper loop shutting down");
                return;
            }
            _ = ticker.tick() => {}
        }

        let now = Utc::now();

        if !window::is_window_open(&config.window, now) {
            let sleep_for = window::sleep_until_next_window(&config.window, now);
            info!(sleep_seconds = sleep_for.as_secs(), "outside maintenance window");
            if sleep_cancellably(sleep_for, &shutdown).await {
                return;
            }
            continue;
        }

        if in_progress.swap(true, Ordering::SeqCst) {
            continue;
        }

        let started = std::time::Instant::now();
        let report = pass::run_pass(
            store.as_ref(),
            cluster.as_ref(),
            releases.as_ref(),
            &config,
            now,
            &shutdown,
        )
        .await;
        in_progress.store(false, Ordering::SeqCst);

        #[cfg(feature = "metrics")]
        {
            let m = crate::metrics::metrics();
            m.passes_total.inc();
            m.pass_duration_seconds.observe(started.elapsed().as_secs_f64());
            m.namespaces_deleted_total.inc_by(report.deleted.len() as u64);
            m.namespaces_delete_failed_total.inc_by(report.failed.len() as u64);
            m.namespaces_postponed_total.inc_by(report.postponed.len() as u64);
        }

        if report.expired == 0 {
            if sleep_cancellably(IDLE_NAP, &shutdown).await {
                return;
            }
        } else {
            info!(
                deleted = report.deleted.len(),
                postponed = report.postponed.len(),
                failed = report.failed.len(),
                skipped_unparsable = report.skipped_unparsable.len(),
                "reconciliation pass complete"
            );
        }
    }
}

/// Sleeps for `duration` unless cancellation fires first. Returns true if
/// the caller should stop.
async fn sleep_cancellably(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
