use crate::domain::entities::sync::{PendingOperation, PendingOperationDraft};
use crate::domain::value_objects::sync::{EntityId, EntityKind, OperationId, OperationStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable, append-only record of writes that the server has not confirmed yet.
#[async_trait]
pub trait MutationLog: Send + Sync {
    /// Persists a new PENDING operation. Fails only when local storage fails.
    async fn append(&self, draft: PendingOperationDraft) -> Result<PendingOperation, AppError>;

    async fn get(&self, id: &OperationId) -> Result<Option<PendingOperation>, AppError>;

    /// Rows in any of `statuses`, ordered by `created_at` then insertion sequence.
    async fn list_by_status(
        &self,
        statuses: &[OperationStatus],
    ) -> Result<Vec<PendingOperation>, AppError>;

    /// Rows of one entity in any of `statuses`, in the same order as `list_by_status`.
    async fn list_for_entity(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        statuses: &[OperationStatus],
    ) -> Result<Vec<PendingOperation>, AppError>;

    async fn count_by_status(&self, statuses: &[OperationStatus]) -> Result<u32, AppError>;

    /// Claims an operation for a remote attempt. Returns `false` when the row is not
    /// PENDING/FAILED or another operation of the same entity is already IN_FLIGHT.
    async fn mark_in_flight(
        &self,
        id: &OperationId,
        attempted_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Rewrites an IN_FLIGHT row as `draft` under a fresh id and returns it to PENDING.
    /// The row keeps its `created_at` and sequence, so it stays ahead of later writes
    /// of the same entity.
    async fn requeue_in_place(
        &self,
        id: &OperationId,
        draft: PendingOperationDraft,
        retry_count: u32,
    ) -> Result<PendingOperation, AppError>;

    /// Confirms the write and removes the row from the log.
    async fn complete(&self, id: &OperationId) -> Result<(), AppError>;

    async fn mark_failed(
        &self,
        id: &OperationId,
        retry_count: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn mark_dead(&self, id: &OperationId, retry_count: u32, error: &str)
    -> Result<(), AppError>;

    /// Returns IN_FLIGHT rows left behind by an interrupted process to PENDING.
    async fn reset_in_flight(&self) -> Result<u32, AppError>;

    /// Deletes a DEAD row. Returns `false` when no DEAD row matched.
    async fn remove_dead(&self, id: &OperationId) -> Result<bool, AppError>;
}
