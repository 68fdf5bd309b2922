//! Supervisor (C8): starts the fetcher and the worker pool, and tears
//! everything down cleanly on a termination signal. See `spec.md` §4.8 /
//! SPEC_FULL §4.8.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{ApiClient, AssetApi};
use crate::config::Config;
use crate::registry::InFlightRegistry;
use crate::scheduler::Scheduler;
use crate::worker::Worker;

/// Queue depth is sized against the worker pool so a burst of eligible
/// jobs doesn't immediately block the scheduler's enqueue call.
const QUEUE_DEPTH_MULTIPLIER: usize = 4;

pub async fn run(config: Config) -> Result<()> {
    config.ensure_temp_dir_writable().await?;

    let config = Arc::new(config);
    let api: Arc<dyn AssetApi> = Arc::new(ApiClient::new(
        config.api_base_url.clone(),
        config.server_api_key.clone(),
        Duration::from_secs(config.request_timeout_seconds),
    ));
    let registry = InFlightRegistry::new();
    let shutdown = CancellationToken::new();

    let (tx, rx) = mpsc::channel(config.max_num_workers * QUEUE_DEPTH_MULTIPLIER);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let scheduler = Scheduler::new(api.clone(), config.clone(), registry.clone(), tx);
    let scheduler_token = shutdown.clone();
    let scheduler_handle = tokio::spawn(scheduler.run(scheduler_token));

    let mut worker_handles = Vec::with_capacity(config.max_num_workers);
    for id in 0..config.max_num_workers {
        let worker = Worker::new(id, api.clone(), &config, registry.clone(), rx.clone());
        worker_handles.push(tokio::spawn(worker.run(shutdown.clone())));
    }

    info!(workers = config.max_num_workers, "supervisor started");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping child tasks");
    shutdown.cancel();

    // Heartbeat companions observe cancellation at the sleep or API
    // boundary within one interval (§4.8); give the scheduler and workers
    // that long to wind down before forcing the join.
    let grace = Duration::from_secs(config.heartbeat_interval_seconds);
    let _ = tokio::time::timeout(grace, scheduler_handle).await;
    for handle in worker_handles {
        let _ = tokio::time::timeout(grace, handle).await;
    }

    info!("supervisor exited cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
