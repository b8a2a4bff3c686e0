use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainSkipReason {
    Offline,
    AlreadyRunning,
}

/// Partial-success accounting for one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: u32,
    pub succeeded: u32,
    pub retried: u32,
    pub dead_lettered: u32,
    pub conflicts: u32,
    pub corrective_enqueued: u32,
    /// Entity groups left waiting on a backoff window.
    pub deferred_groups: u32,
    pub skipped: Option<DrainSkipReason>,
}

impl DrainReport {
    pub fn skipped(reason: DrainSkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: &DrainReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
        self.conflicts += other.conflicts;
        self.corrective_enqueued += other.corrective_enqueued;
        self.deferred_groups += other.deferred_groups;
    }

    pub fn was_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}
