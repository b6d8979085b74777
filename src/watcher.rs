//! Keeps every candidate namespace annotated with a deletion deadline so the
//! reaper can make stateless decisions from the local cache alone.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::controller::Action;
use kube::runtime::reflector::Store;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cluster::ClusterClient;
use crate::colors::{FG1, FG2};
use crate::config::{Config, PRESERVE_ANNOTATION_KEY};
use crate::error::Error;
use crate::timefmt::format_timestamp;

/// Reconciliation resync period — a namespace is revisited at least this
/// often even without a new event, so a missed update eventually self-heals.
const RESYNC_PERIOD: Duration = Duration::from_secs(30);

/// A namespace is managed iff its name matches the configured pattern and it
/// carries no `preserve` annotation.
pub fn is_managed(config: &Config, name: &str, annotations: &BTreeMap<String, String>) -> bool {
    config.deletion_name_regexp.is_match(name) && !annotations.contains_key(PRESERVE_ANNOTATION_KEY)
}

fn initial_deadline(
    creation: chrono::DateTime<chrono::Utc>,
    config: &Config,
) -> chrono::DateTime<chrono::Utc> {
    creation + chrono::Duration::from_std(config.retention).unwrap_or_default()
}

/// Ensure-annotated protocol for a single observed namespace. No-op (no I/O)
/// if the deadline annotation is already present and non-empty.
pub async fn ensure_annotated(
    cluster: &dyn ClusterClient,
    config: &Config,
    ns: &Namespace,
) -> crate::error::Result<()> {
    let name = ns.name_any();
    if name.is_empty() {
        return Ok(());
    }
    let annotations = ns.metadata.annotations.clone().unwrap_or_default();
    if !is_managed(config, &name, &annotations) {
        return Ok(());
    }
    if annotations
        .get(&config.annotation_key)
        .is_some_and(|v| !v.is_empty())
    {
        return Ok(());
    }
    let Some(creation) = ns.metadata.creation_timestamp.clone() else {
        return Ok(());
    };
    let Some(creation) = chrono::DateTime::from_timestamp(
        creation.0.as_second(),
        creation.0.subsec_nanosecond() as u32,
    ) else {
        return Ok(());
    };
    let deadline = initial_deadline(creation, config);
    let stamp = format_timestamp(deadline);
    let mut patch = BTreeMap::new();
    patch.insert(config.annotation_key.clone(), stamp.clone());
    cluster.patch_annotations(&name, patch).await?;
    println!(
        "{}{}{} {}",
        name.color(FG2),
        " -> ".color(FG1),
        stamp.color(FG2),
        "deadline set".color(FG1),
    );
    #[cfg(feature = "metrics")]
    crate::metrics::metrics().annotations_written_total.inc();
    Ok(())
}

struct Context {
    cluster: Arc<dyn ClusterClient>,
    config: Arc<Config>,
}

async fn reconcile(ns: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action, Error> {
    if ns.metadata.deletion_timestamp.is_none() {
        ensure_annotated(ctx.cluster.as_ref(), &ctx.config, &ns).await?;
    }
    Ok(Action::requeue(RESYNC_PERIOD))
}

fn error_policy(ns: Arc<Namespace>, err: &Error, _ctx: Arc<Context>) -> Action {
    warn!(namespace = %ns.name_any(), error = %err, "failed to ensure deadline annotation");
    Action::requeue(RESYNC_PERIOD)
}

/// Builds the namespace `Controller`, returning its reflector `Store` (for
/// the reaper's local-cache reads) alongside the future that drives it until
/// `shutdown` fires.
pub fn build(
    client: Client,
    cluster: Arc<dyn ClusterClient>,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> (Store<Namespace>, impl std::future::Future<Output = ()>) {
    let api: Api<Namespace> = Api::all(client);
    let controller = Controller::new(api, watcher::Config::default().any_semantic());
    let store = controller.store();
    let ctx = Arc::new(Context { cluster, config });

    let run = async move {
        controller
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile, error_policy, ctx)
            .for_each(|res| async move {
                if let Err(e) = res {
                    warn!(error = %e, "namespace watch error");
                }
            })
            .await;
    };

    (store, run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests_support::test_config;

    #[test]
    fn managed_requires_pattern_match() {
        let config = test_config();
        assert!(is_managed(&config, "review-42", &BTreeMap::new()));
        assert!(!is_managed(&config, "kube-system", &BTreeMap::new()));
    }

    #[test]
    fn preserve_annotation_excludes_regardless_of_value() {
        let config = test_config();
        let mut annotations = BTreeMap::new();
        annotations.insert(PRESERVE_ANNOTATION_KEY.to_string(), "anything".to_string());
        assert!(!is_managed(&config, "review-42", &annotations));
    }

    #[test]
    fn initial_deadline_is_creation_plus_retention() {
        let config = test_config();
        let creation: chrono::DateTime<chrono::Utc> = "2025-01-06T00:00:00Z".parse().unwrap();
        let deadline = initial_deadline(creation, &config);
        assert_eq!(deadline, "2025-01-07T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap());
    }
}
