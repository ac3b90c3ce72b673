use anyhow::{Context, Result};
use kube::Client;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use azdo_runner_operator::config::ServeConfig;
use azdo_runner_operator::http::{self, ReadinessState};
use azdo_runner_operator::pool_watch;
use azdo_runner_operator::registry::PoolRegistry;
use azdo_runner_operator::scheduler::PollScheduler;
use azdo_runner_operator::sweeper::ErrorSweeper;

pub async fn run(config: ServeConfig) -> Result<()> {
    info!("controller_starting");

    let client = Client::try_default()
        .await
        .context("failed to connect to Kubernetes cluster")?;

    let registry = PoolRegistry::new();
    let readiness = ReadinessState::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watch_client = client.clone();
    let watch_registry = registry.clone();
    let watch_readiness = readiness.clone();
    let watch_namespace = config.namespace.clone();
    let watch_handle = tokio::spawn(async move {
        pool_watch::run(watch_client, watch_registry, watch_readiness, watch_namespace).await
    });

    let scheduler = PollScheduler::new(registry.clone(), client.clone());
    let scheduler_shutdown = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

    let sweeper = ErrorSweeper::new(registry.clone(), client.clone());
    let sweeper_shutdown = shutdown_rx.clone();
    let sweeper_handle = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let http_readiness = readiness.clone();
    let http_shutdown = shutdown_rx.clone();
    let http_addr = config.http_addr;
    let http_handle =
        tokio::spawn(async move { http::start_http_server(http_readiness, http_shutdown, http_addr).await });

    info!(addr = %http_addr, "http_server_spawned");
    signal::ctrl_c().await?;
    info!("shutdown_signal_received");

    let _ = shutdown_tx.send(true);

    watch_handle.abort();
    let _ = scheduler_handle.await;
    let _ = sweeper_handle.await;
    let _ = http_handle.await?;

    info!("controller_stopped");
    Ok(())
}
