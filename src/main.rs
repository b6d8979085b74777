mod cluster;
mod colors;
mod config;
mod error;
#[cfg(feature = "metrics")]
mod metrics;
mod reaper;
mod shutdown;
mod timefmt;
mod watcher;
mod window;

use std::sync::Arc;

use clap::Parser;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cluster::helm::HelmReleaseClient;
use cluster::kube_client::{KubeClusterClient, ReflectorNamespaceStore};
use cluster::{ClusterClient, NamespaceStore, ReleaseClient};

#[derive(Debug, Parser)]
#[command(name = "review-reaper", version, about = "Reaps expired review namespaces")]
struct Args {
    /// Port for the /healthz, /readyz, /metrics HTTP server. Unset disables it.
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Overrides config.yaml's log_level.
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut cfg = config::load()?;
    if let Some(level) = args.log_level.clone() {
        cfg.log_level = level;
    }
    let config = Arc::new(cfg);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("{}", "review-reaper starting up".cyan());

    let client = kube::Client::try_default().await?;

    let cluster_client: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client.clone()));
    let release_client: Arc<dyn ReleaseClient> = Arc::new(HelmReleaseClient::new());

    let shutdown = CancellationToken::new();

    let (store, watcher_fut) = watcher::build(
        client.clone(),
        cluster_client.clone(),
        config.clone(),
        shutdown.clone(),
    );
    let namespace_store: Arc<dyn NamespaceStore> = Arc::new(ReflectorNamespaceStore::new(
        store,
        config.deletion_name_regexp.clone(),
    ));

    let watcher_handle = tokio::spawn(watcher_fut);

    let reaper_handle = tokio::spawn(reaper::run(
        namespace_store,
        cluster_client,
        release_client,
        config.clone(),
        shutdown.clone(),
    ));

    #[cfg(feature = "metrics")]
    let metrics_handle = args
        .metrics_port
        .map(|port| tokio::spawn(metrics::serve(port, shutdown.clone())));

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        signal_shutdown.cancel();
    });

    let _ = watcher_handle.await;
    let _ = reaper_handle.await;
    #[cfg(feature = "metrics")]
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    println!("{}", "review-reaper stopped".cyan());
    Ok(())
}
