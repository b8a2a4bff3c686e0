use crate::application::ports::connectivity::ConnectivityMonitor;
use crate::application::ports::mutation_log::MutationLog;
use crate::application::ports::remote_sync::{RemoteOutcome, RemoteSyncClient};
use crate::application::ports::snapshot_store::EntitySnapshotStore;
use crate::domain::entities::sync::{
    DeadLetterNotice, DeadLetterReason, DrainReport, DrainSkipReason, EntityGroupKey,
    EntitySnapshot, PendingOperation, PendingOperationDraft,
};
use crate::domain::sync::{ConflictResolver, RetryPolicy};
use crate::domain::value_objects::sync::{
    EntityId, EntityKind, OperationId, OperationPayload, OperationStatus, OperationType,
};
use crate::infrastructure::sync::metrics::{SyncMetrics, SyncMetricsSnapshot};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast};

const OUTSTANDING: &[OperationStatus] = &[OperationStatus::Pending, OperationStatus::Failed];
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const DEAD_LETTER_CHANNEL_CAPACITY: usize = 64;

/// What the group loop does after one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    /// Later operations of the entity must wait for this one.
    Halt,
}

/// Owns the mutation log and pushes its contents to the remote service.
pub struct SyncQueueManager {
    log: Arc<dyn MutationLog>,
    remote: Arc<dyn RemoteSyncClient>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    snapshots: Arc<dyn EntitySnapshotStore>,
    resolver: ConflictResolver,
    policy: RetryPolicy,
    workers: usize,
    request_timeout: Duration,
    metrics: Arc<SyncMetrics>,
    drain_gate: Mutex<()>,
    dead_letters: broadcast::Sender<DeadLetterNotice>,
}

impl SyncQueueManager {
    pub fn new(
        log: Arc<dyn MutationLog>,
        remote: Arc<dyn RemoteSyncClient>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        snapshots: Arc<dyn EntitySnapshotStore>,
    ) -> Self {
        let (dead_letters, _) = broadcast::channel(DEAD_LETTER_CHANNEL_CAPACITY);
        Self {
            log,
            remote,
            connectivity,
            snapshots,
            resolver: ConflictResolver::default(),
            policy: RetryPolicy::default(),
            workers: DEFAULT_WORKERS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics: Arc::new(SyncMetrics::new()),
            drain_gate: Mutex::new(()),
            dead_letters,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Records a local write. Never touches the network.
    pub async fn enqueue(
        &self,
        entity_kind: EntityKind,
        entity_id: Option<EntityId>,
        operation_type: OperationType,
        payload: OperationPayload,
    ) -> Result<OperationId, AppError> {
        let draft = PendingOperationDraft::new(entity_kind, entity_id, operation_type, payload);
        self.enqueue_with_base(draft).await
    }

    pub async fn enqueue_with_base(
        &self,
        draft: PendingOperationDraft,
    ) -> Result<OperationId, AppError> {
        let operation = self.log.append(draft).await.map_err(|err| {
            tracing::error!(target: "sync::queue", error = %err, "failed to persist operation");
            err
        })?;

        tracing::debug!(
            target: "sync::queue",
            operation_id = %operation.id,
            entity_kind = %operation.entity_kind,
            operation_type = %operation.operation_type,
            "operation queued"
        );

        if let Err(err) = self.apply_local_intent(&operation).await {
            tracing::warn!(
                target: "sync::queue",
                operation_id = %operation.id,
                error = %err,
                "queued operation but local snapshot was not updated"
            );
        }

        Ok(operation.id)
    }

    /// PENDING plus FAILED operations.
    pub async fn pending_count(&self) -> Result<u32, AppError> {
        self.log.count_by_status(OUTSTANDING).await
    }

    pub async fn dead_letters(&self) -> Result<Vec<PendingOperation>, AppError> {
        self.log.list_by_status(&[OperationStatus::Dead]).await
    }

    /// Re-submits a DEAD operation's intent under a fresh id. The DEAD row is left as is.
    pub async fn retry_dead(&self, id: &OperationId) -> Result<OperationId, AppError> {
        let dead = self.require_dead(id).await?;
        let draft = PendingOperationDraft::new(
            dead.entity_kind,
            dead.entity_id,
            dead.operation_type,
            dead.payload,
        )
        .with_base_version(dead.base_version);

        let resubmitted = self.enqueue_with_base(draft).await?;
        tracing::info!(
            target: "sync::queue",
            dead_operation_id = %id,
            operation_id = %resubmitted,
            "dead operation resubmitted"
        );
        Ok(resubmitted)
    }

    pub async fn discard_dead(&self, id: &OperationId) -> Result<(), AppError> {
        if !self.log.remove_dead(id).await? {
            return Err(AppError::NotFound(format!("dead operation {id}")));
        }
        tracing::info!(target: "sync::queue", operation_id = %id, "dead operation discarded");
        Ok(())
    }

    /// Startup recovery for operations a previous process left IN_FLIGHT.
    pub async fn recover_interrupted(&self) -> Result<u32, AppError> {
        let recovered = self.log.reset_in_flight().await?;
        if recovered > 0 {
            tracing::info!(target: "sync::queue", recovered, "interrupted operations requeued");
        }
        Ok(recovered)
    }

    pub fn subscribe_dead_letters(&self) -> broadcast::Receiver<DeadLetterNotice> {
        self.dead_letters.subscribe()
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// One drain pass. Overlapping calls return immediately with a skipped report.
    pub async fn drain(&self) -> Result<DrainReport, AppError> {
        let Ok(_gate) = self.drain_gate.try_lock() else {
            tracing::debug!(target: "sync::queue", "drain already running");
            return Ok(self.skip(DrainSkipReason::AlreadyRunning));
        };

        if !self.connectivity.is_reachable() {
            tracing::debug!(target: "sync::queue", "remote unreachable, drain deferred");
            return Ok(self.skip(DrainSkipReason::Offline));
        }

        let started = Instant::now();
        let now = Utc::now();
        let outstanding = self.log.list_by_status(OUTSTANDING).await?;
        if outstanding.is_empty() {
            return Ok(DrainReport::default());
        }

        let groups = group_by_entity(outstanding);
        tracing::debug!(
            target: "sync::queue",
            groups = groups.len(),
            workers = self.workers,
            "drain started"
        );

        let reports: Vec<DrainReport> = futures::stream::iter(groups)
            .map(|operations| self.drain_group(operations, now))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = DrainReport::default();
        for partial in &reports {
            report.merge(partial);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_pass(&report, duration_ms);
        tracing::info!(
            target: "sync::queue",
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            dead_lettered = report.dead_lettered,
            conflicts = report.conflicts,
            duration_ms,
            "drain finished"
        );

        Ok(report)
    }

    fn skip(&self, reason: DrainSkipReason) -> DrainReport {
        let report = DrainReport::skipped(reason);
        self.metrics.record_pass(&report, 0);
        report
    }

    async fn drain_group(
        &self,
        operations: Vec<PendingOperation>,
        now: DateTime<Utc>,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        for operation in operations {
            if !self.connectivity.is_reachable() {
                tracing::debug!(target: "sync::queue", "connectivity lost during drain");
                break;
            }

            let exhausted = operation.status == OperationStatus::Failed
                && self.policy.is_exhausted(operation.retry_count);
            if !exhausted && !operation.is_eligible(now, self.policy.max_retries) {
                report.deferred_groups += 1;
                break;
            }

            let step = if exhausted {
                self.retire_exhausted(&operation, &mut report).await
            } else {
                self.attempt(&operation, &mut report).await
            };

            match step {
                Ok(Step::Continue) => continue,
                Ok(Step::Halt) => break,
                Err(err) => {
                    tracing::error!(
                        target: "sync::queue",
                        operation_id = %operation.id,
                        error = %err,
                        "operation attempt aborted"
                    );
                    self.release_after_error(&operation, &err, &mut report).await;
                    break;
                }
            }
        }

        report
    }

    async fn attempt(
        &self,
        operation: &PendingOperation,
        report: &mut DrainReport,
    ) -> Result<Step, AppError> {
        if !self.log.mark_in_flight(&operation.id, Utc::now()).await? {
            tracing::debug!(
                target: "sync::queue",
                operation_id = %operation.id,
                "entity busy, operation left for a later pass"
            );
            return Ok(Step::Halt);
        }
        report.attempted += 1;

        let outcome = match tokio::time::timeout(self.request_timeout, self.remote.send(operation))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => RemoteOutcome::retryable(format!(
                "request timed out after {}ms",
                self.request_timeout.as_millis()
            )),
        };

        tracing::debug!(
            target: "sync::queue",
            operation_id = %operation.id,
            outcome = outcome.label(),
            retry_count = operation.retry_count,
            "remote attempt finished"
        );

        match outcome {
            RemoteOutcome::Success(remote) => {
                self.log.complete(&operation.id).await?;
                report.succeeded += 1;
                if let Err(err) = self.apply_confirmed(operation, remote).await {
                    tracing::warn!(
                        target: "sync::queue",
                        operation_id = %operation.id,
                        error = %err,
                        "confirmed write not reflected in local snapshot"
                    );
                }
                Ok(Step::Continue)
            }
            RemoteOutcome::Conflict(remote) => {
                report.conflicts += 1;
                self.reconcile(operation, remote, report).await
            }
            RemoteOutcome::RetryableError(message) => {
                let retry_count = operation.retry_count.saturating_add(1);
                if self.policy.is_exhausted(retry_count) {
                    self.dead_letter(
                        operation,
                        retry_count,
                        &message,
                        DeadLetterReason::RetriesExhausted,
                    )
                    .await?;
                    report.dead_lettered += 1;
                    return Ok(Step::Continue);
                }

                let next_attempt_at = self.policy.next_attempt_at(Utc::now(), retry_count);
                self.log
                    .mark_failed(&operation.id, retry_count, &message, next_attempt_at)
                    .await?;
                report.retried += 1;
                tracing::warn!(
                    target: "sync::queue",
                    operation_id = %operation.id,
                    retry_count,
                    next_attempt_at = %next_attempt_at,
                    error = %message,
                    "operation failed, retry scheduled"
                );
                Ok(Step::Halt)
            }
            RemoteOutcome::PermanentError { status, message } => {
                tracing::warn!(
                    target: "sync::queue",
                    operation_id = %operation.id,
                    status = ?status,
                    error = %message,
                    "operation rejected by remote"
                );
                self.dead_letter(
                    operation,
                    operation.retry_count,
                    &message,
                    DeadLetterReason::Rejected,
                )
                .await?;
                report.dead_lettered += 1;
                Ok(Step::Continue)
            }
        }
    }

    /// FAILED rows whose budget shrank under a lower `max_retries`.
    async fn retire_exhausted(
        &self,
        operation: &PendingOperation,
        report: &mut DrainReport,
    ) -> Result<Step, AppError> {
        if !self.log.mark_in_flight(&operation.id, Utc::now()).await? {
            return Ok(Step::Halt);
        }
        let message = operation
            .last_error
            .clone()
            .unwrap_or_else(|| "retry budget exhausted".to_string());
        self.dead_letter(
            operation,
            operation.retry_count,
            &message,
            DeadLetterReason::RetriesExhausted,
        )
        .await?;
        report.dead_lettered += 1;
        Ok(Step::Continue)
    }

    async fn dead_letter(
        &self,
        operation: &PendingOperation,
        retry_count: u32,
        message: &str,
        reason: DeadLetterReason,
    ) -> Result<(), AppError> {
        self.log.mark_dead(&operation.id, retry_count, message).await?;

        let notice = DeadLetterNotice {
            operation_id: operation.id.clone(),
            entity_kind: operation.entity_kind.clone(),
            entity_id: operation.entity_id.clone(),
            operation_type: operation.operation_type,
            retry_count,
            last_error: Some(message.to_string()),
            reason,
            dead_at: Utc::now(),
        };
        // No subscribers is fine; the row stays queryable.
        let _ = self.dead_letters.send(notice);

        tracing::error!(
            target: "sync::queue",
            operation_id = %operation.id,
            entity_kind = %operation.entity_kind,
            retry_count,
            reason = ?reason,
            "operation moved to dead letters"
        );
        Ok(())
    }

    /// Puts a claimed row back on the retry schedule after a local failure. A row that
    /// cannot be released stays IN_FLIGHT until `recover_interrupted` runs.
    async fn release_after_error(
        &self,
        operation: &PendingOperation,
        err: &AppError,
        report: &mut DrainReport,
    ) {
        let retry_count = operation.retry_count.saturating_add(1);
        let message = format!("local error during sync: {err}");

        let released = if self.policy.is_exhausted(retry_count) {
            self.dead_letter(
                operation,
                retry_count,
                &message,
                DeadLetterReason::RetriesExhausted,
            )
            .await
            .map(|()| report.dead_lettered += 1)
        } else {
            let next_attempt_at = self.policy.next_attempt_at(Utc::now(), retry_count);
            self.log
                .mark_failed(&operation.id, retry_count, &message, next_attempt_at)
                .await
                .map(|()| report.retried += 1)
        };

        match released {
            Ok(()) => {}
            Err(AppError::InvalidStateTransition(_)) => tracing::debug!(
                target: "sync::queue",
                operation_id = %operation.id,
                "operation was not claimed, nothing to release"
            ),
            Err(release_err) => tracing::error!(
                target: "sync::queue",
                operation_id = %operation.id,
                error = %release_err,
                "operation left in flight until restart recovery"
            ),
        }
    }

    /// Settles a conflict. The operation either finishes (server state adopted, or its
    /// fields are rewritten by later queued writes) or is rewritten in place as a
    /// corrective write that stays ahead of those later writes.
    async fn reconcile(
        &self,
        operation: &PendingOperation,
        remote: EntitySnapshot,
        report: &mut DrainReport,
    ) -> Result<Step, AppError> {
        let later = self.later_writes(operation).await?;
        let superseded = later
            .iter()
            .any(|queued| queued.operation_type == OperationType::Delete);

        let (correction, merged) = if operation.operation_type == OperationType::Delete {
            let draft = PendingOperationDraft::new(
                operation.entity_kind.clone(),
                remote.entity_id.clone().or_else(|| operation.entity_id.clone()),
                OperationType::Delete,
                OperationPayload::empty(),
            )
            .with_base_version(remote.server_version);
            (Some(draft), None)
        } else {
            let local = self.local_view(operation).await?;
            let resolution = self.resolver.resolve(&local, &remote);

            // Only this operation's own fields are re-sent, and only those no later
            // queued write is about to overwrite.
            let mut fields = resolution.corrective_fields();
            fields.retain(|name, _| {
                operation.payload.fields().contains_key(name) && !written_by(&later, name)
            });

            let mut merged = resolution.merged.clone();
            for name in resolution.changed_fields() {
                if fields.contains_key(name) {
                    continue;
                }
                match remote.field(name) {
                    Some(value) => merged.fields.insert(name.clone(), value.clone()),
                    None => merged.fields.remove(name),
                };
            }

            let draft = (!fields.is_empty()).then(|| {
                let entity_id = merged.entity_id.clone();
                let operation_type = if entity_id.is_some() {
                    OperationType::Update
                } else {
                    OperationType::Create
                };
                PendingOperationDraft::new(
                    operation.entity_kind.clone(),
                    entity_id,
                    operation_type,
                    OperationPayload::from_fields(fields),
                )
                .with_base_version(remote.server_version)
            });
            (draft, Some(merged))
        };

        let step = match correction.filter(|_| !superseded) {
            None => {
                self.log.complete(&operation.id).await?;
                tracing::debug!(
                    target: "sync::queue",
                    operation_id = %operation.id,
                    superseded,
                    "conflict settled without a corrective write"
                );
                Step::Continue
            }
            Some(draft) => {
                let retry_count = operation.retry_count.saturating_add(1);
                if self.policy.is_exhausted(retry_count) {
                    self.dead_letter(
                        operation,
                        retry_count,
                        "conflict persisted across corrective writes",
                        DeadLetterReason::ConflictUnresolved,
                    )
                    .await?;
                    report.dead_lettered += 1;
                    Step::Continue
                } else {
                    let corrective = self
                        .log
                        .requeue_in_place(&operation.id, draft, retry_count)
                        .await?;
                    report.corrective_enqueued += 1;
                    tracing::info!(
                        target: "sync::queue",
                        operation_id = %operation.id,
                        corrective_id = %corrective.id,
                        retry_count,
                        "conflict merged, corrective write queued in place"
                    );
                    Step::Halt
                }
            }
        };

        if let Some(merged) = merged {
            if let Err(err) = self.store_with_later_writes(merged, &later).await {
                tracing::warn!(
                    target: "sync::queue",
                    operation_id = %operation.id,
                    error = %err,
                    "merged state not reflected in local snapshot"
                );
            }
        }
        Ok(step)
    }

    /// Outstanding writes of the same entity other than `operation`, oldest first.
    async fn later_writes(
        &self,
        operation: &PendingOperation,
    ) -> Result<Vec<PendingOperation>, AppError> {
        let Some(entity_id) = &operation.entity_id else {
            return Ok(Vec::new());
        };
        let queued = self
            .log
            .list_for_entity(&operation.entity_kind, entity_id, OUTSTANDING)
            .await?;
        Ok(queued
            .into_iter()
            .filter(|queued| queued.id != operation.id)
            .collect())
    }

    /// Stores server-derived state with still-queued local writes laid over it.
    async fn store_with_later_writes(
        &self,
        mut snapshot: EntitySnapshot,
        later: &[PendingOperation],
    ) -> Result<(), AppError> {
        if later
            .iter()
            .any(|queued| queued.operation_type == OperationType::Delete)
        {
            return Ok(());
        }
        for queued in later {
            snapshot.apply_payload(&queued.payload, queued.created_at.timestamp_millis());
        }
        self.snapshots.put(&snapshot).await
    }

    /// Stored snapshot with this operation's intent laid over it.
    async fn local_view(&self, operation: &PendingOperation) -> Result<EntitySnapshot, AppError> {
        let stored = match &operation.entity_id {
            Some(entity_id) => self.snapshots.get(&operation.entity_kind, entity_id).await?,
            None => None,
        };
        let mut local = stored.unwrap_or_else(|| {
            EntitySnapshot::new(
                operation.entity_kind.clone(),
                operation.entity_id.clone(),
                Map::new(),
                0,
            )
        });
        local.apply_payload(&operation.payload, operation.created_at.timestamp_millis());
        Ok(local)
    }

    async fn apply_local_intent(&self, operation: &PendingOperation) -> Result<(), AppError> {
        let Some(entity_id) = &operation.entity_id else {
            return Ok(());
        };
        if operation.operation_type == OperationType::Delete {
            return self.snapshots.delete(&operation.entity_kind, entity_id).await;
        }
        let local = self.local_view(operation).await?;
        self.snapshots.put(&local).await
    }

    async fn apply_confirmed(
        &self,
        operation: &PendingOperation,
        remote: Option<EntitySnapshot>,
    ) -> Result<(), AppError> {
        if operation.operation_type == OperationType::Delete {
            if let Some(entity_id) = &operation.entity_id {
                self.snapshots.delete(&operation.entity_kind, entity_id).await?;
            }
            return Ok(());
        }
        match remote {
            Some(snapshot) => {
                let later = self.later_writes(operation).await?;
                self.store_with_later_writes(snapshot, &later).await
            }
            None => Ok(()),
        }
    }

    async fn require_dead(&self, id: &OperationId) -> Result<PendingOperation, AppError> {
        let operation = self
            .log
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("operation {id}")))?;
        if operation.status != OperationStatus::Dead {
            return Err(AppError::InvalidStateTransition(format!(
                "operation {id} is {}, only dead operations can be retried",
                operation.status
            )));
        }
        Ok(operation)
    }
}

fn written_by(operations: &[PendingOperation], field: &str) -> bool {
    operations
        .iter()
        .any(|operation| operation.payload.fields().contains_key(field))
}

/// Splits outstanding operations into per-entity queues, keeping creation order inside each
/// queue and ordering queues by their oldest operation.
fn group_by_entity(operations: Vec<PendingOperation>) -> Vec<Vec<PendingOperation>> {
    let mut index: HashMap<EntityGroupKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<PendingOperation>> = Vec::new();

    for operation in operations {
        let key = operation.group_key();
        match index.get(&key) {
            Some(&position) => groups[position].push(operation),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![operation]);
            }
        }
    }

    groups
}
