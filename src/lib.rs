//! logscan -- scheduled Kubernetes log scanning with AI incident analysis.
//!
//! Users register log scan jobs against a namespace. A background scheduler
//! tails pod logs when each job is due, keeps lines matching the job's log
//! levels, chains every line through the analysis microservices, and records
//! the results as incidents. Jobs and incidents persist to JSON snapshots.

pub mod api;
pub mod config;
pub mod detect;
pub mod jobs;
pub mod logsource;
pub mod pipeline;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::jobs::JobService;
use crate::logsource::KubeLogSource;
use crate::pipeline::Pipeline;
use crate::scheduler::{LogScanExecutor, Scheduler};
use crate::storage::Store;

/// Start the gateway: load persisted state, start the scheduler, and serve
/// the API until SIGINT/SIGTERM.
pub async fn serve(config: AppConfig) -> Result<()> {
    // 1. Restore persisted state
    let store = Store::new(&config.storage);
    let jobs = store.load_jobs().await.context("loading jobs snapshot")?;
    let incidents = store
        .load_incidents()
        .await
        .context("loading incidents snapshot")?;
    info!(jobs, incidents, "Restored persisted state");

    // 2. Wire the scan executor
    let log_source =
        KubeLogSource::new(&config.log_source).context("configuring Kubernetes log source")?;
    let pipeline = Pipeline::new(&config.pipeline).context("building pipeline HTTP client")?;
    let executor = LogScanExecutor::new(Arc::new(log_source), pipeline, config.log_source.tail_lines);

    // 3. Start the scheduler
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        Arc::new(executor),
        &config.scheduler,
    ));
    scheduler.start().await;

    // 4. Serve the API
    let app = api::router(api::state::AppState {
        jobs: JobService::new(store.clone()),
        scheduler: scheduler.clone(),
    });
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "logscan listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 5. Stop polling and flush what is in memory
    scheduler.stop().await;
    if let Err(e) = store.save_jobs().await {
        error!(error = %e, "Final jobs save failed");
    }
    if let Err(e) = store.save_incidents().await {
        error!(error = %e, "Final incidents save failed");
    }

    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
