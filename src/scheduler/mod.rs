//! Job scheduler -- polls the store and runs due log scan jobs.
//!
//! A single background loop sweeps all jobs every poll interval. Due jobs
//! run on their own tasks, bounded by a semaphore; a sweep never waits for a
//! slot. Polling is coarse on purpose: a job whose interval is shorter than
//! the poll interval runs about once per sweep.

mod engine;
pub mod executor;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use self::engine::Engine;
pub use self::engine::SweepReport;
pub use self::executor::{ExecutionError, JobExecutor, LogScanExecutor};
use crate::config::SchedulerConfig;
use crate::storage::Store;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotStarted,
    Running,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::NotStarted => "not_started",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        }
    }
}

enum Lifecycle {
    NotStarted,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Owns the polling loop. Each instance runs at most one loop in its
/// lifetime; build a new instance to start over.
pub struct Scheduler {
    engine: Engine,
    lifecycle: AsyncMutex<Lifecycle>,
}

impl Scheduler {
    pub fn new(store: Store, executor: Arc<dyn JobExecutor>, config: &SchedulerConfig) -> Self {
        let slots = config.max_concurrent_jobs.max(1);
        Self {
            engine: Engine {
                store,
                executor,
                limiter: Arc::new(Semaphore::new(slots)),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                poll_interval: config.poll_interval(),
            },
            lifecycle: AsyncMutex::new(Lifecycle::NotStarted),
        }
    }

    /// Spawn the polling loop. Only the first call does anything; returns
    /// whether this call started the loop.
    pub async fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::NotStarted) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.engine.clone().run(cancel.clone()));
        *lifecycle = Lifecycle::Running { cancel, handle };
        info!("Scheduler started");
        true
    }

    /// Stop the polling loop and wait for it to exit. Running jobs finish on
    /// their own. Safe to call any number of times; returns whether this
    /// call stopped a running loop.
    pub async fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        // Never started stays never started.
        if !matches!(*lifecycle, Lifecycle::Running { .. }) {
            return false;
        }
        let Lifecycle::Running { cancel, handle } =
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        else {
            return false;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Scheduler loop ended abnormally");
        }
        info!(in_flight = self.in_flight(), "Scheduler stopped");
        true
    }

    pub async fn state(&self) -> SchedulerState {
        match *self.lifecycle.lock().await {
            Lifecycle::NotStarted => SchedulerState::NotStarted,
            Lifecycle::Running { .. } => SchedulerState::Running,
            Lifecycle::Stopped => SchedulerState::Stopped,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == SchedulerState::Running
    }

    /// Run one sweep immediately, outside the polling loop.
    pub async fn sweep_now(&self) -> SweepReport {
        self.engine.sweep(Utc::now()).await
    }

    /// Number of jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.engine
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn available_slots(&self) -> usize {
        self.engine.limiter.available_permits()
    }
}
