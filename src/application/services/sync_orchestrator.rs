use super::sync_queue_service::SyncQueueManager;
use crate::application::ports::connectivity::ConnectivityMonitor;
use crate::domain::entities::sync::{DrainReport, DrainSkipReason};
use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Stopped,
    Scheduled,
    Draining,
}

struct PeriodicHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Decides when the queue drains: foreground transitions, manual requests and a
/// periodic schedule.
#[derive(Clone)]
pub struct SyncOrchestrator {
    queue: Arc<SyncQueueManager>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    state: Arc<watch::Sender<OrchestratorState>>,
    scheduled: Arc<AtomicBool>,
    active_passes: Arc<AtomicUsize>,
    periodic: Arc<Mutex<Option<PeriodicHandle>>>,
}

impl SyncOrchestrator {
    pub fn new(queue: Arc<SyncQueueManager>, connectivity: Arc<dyn ConnectivityMonitor>) -> Self {
        let (state, _) = watch::channel(OrchestratorState::Stopped);
        Self {
            queue,
            connectivity,
            state: Arc::new(state),
            scheduled: Arc::new(AtomicBool::new(false)),
            active_passes: Arc::new(AtomicUsize::new(0)),
            periodic: Arc::new(Mutex::new(None)),
        }
    }

    /// App came to the foreground. Offline is not an error; the pass is simply skipped.
    pub async fn trigger_foreground(&self) -> Result<DrainReport, AppError> {
        if !self.connectivity.is_reachable() {
            tracing::debug!(target: "sync::orchestrator", "foreground trigger while offline");
            return Ok(DrainReport::skipped(DrainSkipReason::Offline));
        }
        self.run_pass("foreground").await
    }

    /// User asked for a sync. Same semantics as a foreground trigger, reported back.
    pub async fn sync_now(&self) -> Result<DrainReport, AppError> {
        if !self.connectivity.is_reachable() {
            tracing::info!(target: "sync::orchestrator", "manual sync requested while offline");
            return Ok(DrainReport::skipped(DrainSkipReason::Offline));
        }
        self.run_pass("manual").await
    }

    /// Starts (or restarts with a new interval) the periodic schedule. The first tick
    /// fires one interval from now.
    pub fn start_periodic(&self, interval: Duration) -> Result<(), AppError> {
        if interval.is_zero() {
            return Err(AppError::InvalidInput(
                "Sync interval must be greater than 0".to_string(),
            ));
        }

        let mut periodic = self
            .periodic
            .lock()
            .map_err(|_| AppError::Internal("periodic sync lock poisoned".to_string()))?;
        if let Some(previous) = periodic.take() {
            let _ = previous.shutdown.send(true);
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let orchestrator = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        orchestrator.tick().await;
                    }
                }
            }
            tracing::debug!(target: "sync::orchestrator", "periodic sync loop exited");
        });

        *periodic = Some(PeriodicHandle { shutdown, task });
        self.scheduled.store(true, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if *state == OrchestratorState::Stopped {
                *state = OrchestratorState::Scheduled;
                true
            } else {
                false
            }
        });

        tracing::info!(
            target: "sync::orchestrator",
            interval_secs = interval.as_secs_f64(),
            "periodic sync scheduled"
        );
        Ok(())
    }

    /// Cancels the schedule. A pass already running is allowed to finish.
    pub fn stop(&self) {
        let handle = match self.periodic.lock() {
            Ok(mut periodic) => periodic.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        self.scheduled.store(false, Ordering::SeqCst);

        if let Some(handle) = handle {
            let _ = handle.shutdown.send(true);
            drop(handle.task);
            tracing::info!(target: "sync::orchestrator", "periodic sync stopped");
        }
        self.state.send_replace(OrchestratorState::Stopped);
    }

    pub async fn pending_count(&self) -> Result<u32, AppError> {
        self.queue.pending_count().await
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    pub fn queue(&self) -> &Arc<SyncQueueManager> {
        &self.queue
    }

    async fn tick(&self) {
        if !self.connectivity.is_reachable() {
            tracing::debug!(target: "sync::orchestrator", "tick skipped, offline");
            return;
        }
        if let Err(err) = self.run_pass("periodic").await {
            tracing::error!(target: "sync::orchestrator", error = %err, "periodic drain failed");
        }
    }

    async fn run_pass(&self, trigger: &'static str) -> Result<DrainReport, AppError> {
        self.active_passes.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if *state == OrchestratorState::Draining {
                false
            } else {
                *state = OrchestratorState::Draining;
                true
            }
        });

        let result = self.queue.drain().await;

        if self.active_passes.fetch_sub(1, Ordering::SeqCst) == 1 {
            let resting = if self.scheduled.load(Ordering::SeqCst) {
                OrchestratorState::Scheduled
            } else {
                OrchestratorState::Stopped
            };
            self.state.send_if_modified(|state| {
                if *state == OrchestratorState::Draining {
                    *state = resting;
                    true
                } else {
                    false
                }
            });
        }

        match &result {
            Ok(report) => tracing::debug!(
                target: "sync::orchestrator",
                trigger,
                attempted = report.attempted,
                skipped = ?report.skipped,
                "drain pass complete"
            ),
            Err(err) => tracing::warn!(
                target: "sync::orchestrator",
                trigger,
                error = %err,
                "drain pass failed"
            ),
        }
        result
    }
}
