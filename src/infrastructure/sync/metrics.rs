use crate::domain::entities::sync::DrainReport;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub passes: u64,
    pub skipped_passes: u64,
    pub total_succeeded: u64,
    pub total_retried: u64,
    pub total_dead_lettered: u64,
    pub total_conflicts: u64,
    /// Passes in a row that attempted work and confirmed none of it.
    pub consecutive_failed_passes: u64,
    pub last_pass_ms: Option<u64>,
    pub last_duration_ms: Option<u64>,
    pub last_report: Option<DrainReport>,
}

#[derive(Default, Clone)]
struct LastPass {
    duration_ms: Option<u64>,
    report: Option<DrainReport>,
}

/// Drain counters owned by one queue manager.
pub struct SyncMetrics {
    passes: AtomicU64,
    skipped_passes: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    conflicts: AtomicU64,
    consecutive_failed_passes: AtomicU64,
    last_pass_ms: AtomicU64,
    last: Mutex<LastPass>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            passes: AtomicU64::new(0),
            skipped_passes: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            consecutive_failed_passes: AtomicU64::new(0),
            last_pass_ms: AtomicU64::new(0),
            last: Mutex::new(LastPass::default()),
        }
    }

    pub fn record_pass(&self, report: &DrainReport, duration_ms: u64) {
        if report.was_skipped() {
            self.skipped_passes.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
        self.succeeded
            .fetch_add(u64::from(report.succeeded), Ordering::Relaxed);
        self.retried
            .fetch_add(u64::from(report.retried), Ordering::Relaxed);
        self.dead_lettered
            .fetch_add(u64::from(report.dead_lettered), Ordering::Relaxed);
        self.conflicts
            .fetch_add(u64::from(report.conflicts), Ordering::Relaxed);
        self.last_pass_ms.store(current_unix_ms(), Ordering::Relaxed);

        if report.attempted > 0 && report.succeeded == 0 && report.conflicts == 0 {
            self.consecutive_failed_passes
                .fetch_add(1, Ordering::Relaxed);
        } else if report.attempted > 0 {
            self.consecutive_failed_passes.store(0, Ordering::Relaxed);
        }

        if let Ok(mut guard) = self.last.lock() {
            guard.duration_ms = Some(duration_ms);
            guard.report = Some(report.clone());
        }
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let last = self
            .last
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| LastPass::default());

        SyncMetricsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            skipped_passes: self.skipped_passes.load(Ordering::Relaxed),
            total_succeeded: self.succeeded.load(Ordering::Relaxed),
            total_retried: self.retried.load(Ordering::Relaxed),
            total_dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            total_conflicts: self.conflicts.load(Ordering::Relaxed),
            consecutive_failed_passes: self.consecutive_failed_passes.load(Ordering::Relaxed),
            last_pass_ms: to_option(self.last_pass_ms.load(Ordering::Relaxed)),
            last_duration_ms: last.duration_ms,
            last_report: last.report,
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
