//! Prometheus metrics for the two loops, served over HTTP alongside
//! liveness/readiness probes. Gated behind the `metrics` feature (on by
//! default) the same way it's optional in the crate this was grown from.

use std::sync::OnceLock;

use owo_colors::OwoColorize;
use prometheus::{register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Process-wide metrics, registered with the default prometheus registry on
/// first use.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| Metrics::new().expect("prometheus metric registration"))
}

pub struct Metrics {
    pub passes_total: IntCounter,
    pub namespaces_deleted_total: IntCounter,
    pub namespaces_delete_failed_total: IntCounter,
    pub namespaces_postponed_total: IntCounter,
    pub annotations_written_total: IntCounter,
    pub pass_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            passes_total: register_int_counter!(
                "review_reaper_passes_total",
                "Reconciliation passes executed"
            )?,
            namespaces_deleted_total: register_int_counter!(
                "review_reaper_namespaces_deleted_total",
                "Namespaces deleted"
            )?,
            namespaces_delete_failed_total: register_int_counter!(
                "review_reaper_namespaces_delete_failed_total",
                "Namespace deletions that failed"
            )?,
            namespaces_postponed_total: register_int_counter!(
                "review_reaper_namespaces_postponed_total",
                "Deletion deadlines postponed due to recent activity"
            )?,
            annotations_written_total: register_int_counter!(
                "review_reaper_annotations_written_total",
                "Deadline annotations written by the watcher"
            )?,
            pass_duration_seconds: register_histogram!(
                "review_reaper_pass_duration_seconds",
                "Wall-clock duration of a reconciliation pass"
            )?,
        })
    }
}

async fn render_metrics() -> String {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .expect("encoding prometheus metrics never fails for well-formed families");
    String::from_utf8(buffer).expect("prometheus text encoding is always valid utf8")
}

pub async fn serve(port: u16, shutdown: CancellationToken) {
    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/readyz", axum::routing::get(|| async { "ok" }))
        .route("/metrics", axum::routing::get(render_metrics));

    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind metrics server");
            return;
        }
    };
    println!("{}", format!("metrics server listening on {addr}").green());
    let _ = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
}
