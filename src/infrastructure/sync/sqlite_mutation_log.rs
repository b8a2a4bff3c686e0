use super::mappers::pending_operation_from_row;
use super::rows::PendingOperationRow;
use crate::application::ports::mutation_log::MutationLog;
use crate::domain::entities::sync::{PendingOperation, PendingOperationDraft};
use crate::domain::value_objects::sync::{EntityId, EntityKind, OperationId, OperationStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

const SELECT_COLUMNS: &str = r#"
    SELECT sequence, id, entity_kind, entity_id, operation_type, payload, base_version,
           status, retry_count, created_at, last_attempt_at, next_attempt_at, last_error
    FROM pending_operations
"#;

pub struct SqliteMutationLog {
    pool: Pool<Sqlite>,
}

impl SqliteMutationLog {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    fn ensure_transitioned(
        id: &OperationId,
        rows_affected: u64,
        target: OperationStatus,
    ) -> Result<(), AppError> {
        if rows_affected == 0 {
            return Err(AppError::InvalidStateTransition(format!(
                "operation {id} is not in flight, cannot move to {target}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MutationLog for SqliteMutationLog {
    async fn append(&self, draft: PendingOperationDraft) -> Result<PendingOperation, AppError> {
        draft.validate().map_err(AppError::ValidationError)?;

        let id = OperationId::generate();
        let payload = draft.payload.to_json_string()?;
        let created_at = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO pending_operations (
                id, entity_kind, entity_id, operation_type, payload,
                base_version, status, retry_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7)
            "#,
        )
        .bind(id.as_str())
        .bind(draft.entity_kind.as_str())
        .bind(draft.entity_id.as_ref().map(|entity_id| entity_id.as_str()))
        .bind(draft.operation_type.as_str())
        .bind(&payload)
        .bind(draft.base_version)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| AppError::Storage(err.to_string()))?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Storage(format!("operation {id} vanished after insert")))
    }

    async fn get(&self, id: &OperationId) -> Result<Option<PendingOperation>, AppError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query_as::<_, PendingOperationRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(pending_operation_from_row).transpose()
    }

    async fn list_by_status(
        &self,
        statuses: &[OperationStatus],
    ) -> Result<Vec<PendingOperation>, AppError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{SELECT_COLUMNS} WHERE status IN ({}) ORDER BY created_at ASC, sequence ASC",
            Self::placeholders(statuses.len())
        );
        let mut query = sqlx::query_as::<_, PendingOperationRow>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(pending_operation_from_row)
            .collect()
    }

    async fn list_for_entity(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        statuses: &[OperationStatus],
    ) -> Result<Vec<PendingOperation>, AppError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{SELECT_COLUMNS} WHERE entity_kind = ? AND entity_id = ? AND status IN ({}) \
             ORDER BY created_at ASC, sequence ASC",
            Self::placeholders(statuses.len())
        );
        let mut query = sqlx::query_as::<_, PendingOperationRow>(&sql)
            .bind(entity_kind.as_str())
            .bind(entity_id.as_str());
        for status in statuses {
            query = query.bind(status.as_str());
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(pending_operation_from_row)
            .collect()
    }

    async fn count_by_status(&self, statuses: &[OperationStatus]) -> Result<u32, AppError> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "SELECT COUNT(*) FROM pending_operations WHERE status IN ({})",
            Self::placeholders(statuses.len())
        );
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let (count,) = query.fetch_one(&self.pool).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn mark_in_flight(
        &self,
        id: &OperationId,
        attempted_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = 'in_flight', last_attempt_at = ?1
            WHERE id = ?2
              AND status IN ('pending', 'failed')
              AND NOT EXISTS (
                  SELECT 1 FROM pending_operations AS other
                  WHERE other.status = 'in_flight'
                    AND other.entity_id IS NOT NULL
                    AND other.entity_kind = pending_operations.entity_kind
                    AND other.entity_id = pending_operations.entity_id
              )
            "#,
        )
        .bind(attempted_at.timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn requeue_in_place(
        &self,
        id: &OperationId,
        draft: PendingOperationDraft,
        retry_count: u32,
    ) -> Result<PendingOperation, AppError> {
        draft.validate().map_err(AppError::ValidationError)?;

        let new_id = OperationId::generate();
        let payload = draft.payload.to_json_string()?;

        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET id = ?1,
                entity_id = ?2,
                operation_type = ?3,
                payload = ?4,
                base_version = ?5,
                status = 'pending',
                retry_count = MAX(retry_count, ?6),
                next_attempt_at = NULL,
                last_error = NULL
            WHERE id = ?7 AND status = 'in_flight' AND entity_kind = ?8
            "#,
        )
        .bind(new_id.as_str())
        .bind(draft.entity_id.as_ref().map(|entity_id| entity_id.as_str()))
        .bind(draft.operation_type.as_str())
        .bind(&payload)
        .bind(draft.base_version)
        .bind(i64::from(retry_count))
        .bind(id.as_str())
        .bind(draft.entity_kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| AppError::Storage(err.to_string()))?;
        Self::ensure_transitioned(id, result.rows_affected(), OperationStatus::Pending)?;

        self.get(&new_id)
            .await?
            .ok_or_else(|| AppError::Storage(format!("operation {new_id} vanished after requeue")))
    }

    async fn complete(&self, id: &OperationId) -> Result<(), AppError> {
        let result = sqlx::query(
            "DELETE FROM pending_operations WHERE id = ?1 AND status = 'in_flight'",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Self::ensure_transitioned(id, result.rows_affected(), OperationStatus::Succeeded)
    }

    async fn mark_failed(
        &self,
        id: &OperationId,
        retry_count: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = 'failed',
                retry_count = MAX(retry_count, ?1),
                last_error = ?2,
                next_attempt_at = ?3
            WHERE id = ?4 AND status = 'in_flight'
            "#,
        )
        .bind(i64::from(retry_count))
        .bind(error)
        .bind(next_attempt_at.timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Self::ensure_transitioned(id, result.rows_affected(), OperationStatus::Failed)
    }

    async fn mark_dead(
        &self,
        id: &OperationId,
        retry_count: u32,
        error: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = 'dead',
                retry_count = MAX(retry_count, ?1),
                last_error = ?2,
                next_attempt_at = NULL
            WHERE id = ?3 AND status = 'in_flight'
            "#,
        )
        .bind(i64::from(retry_count))
        .bind(error)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Self::ensure_transitioned(id, result.rows_affected(), OperationStatus::Dead)
    }

    async fn reset_in_flight(&self) -> Result<u32, AppError> {
        let result = sqlx::query(
            "UPDATE pending_operations SET status = 'pending' WHERE status = 'in_flight'",
        )
        .execute(&self.pool)
        .await?;

        Ok(u32::try_from(result.rows_affected()).unwrap_or(u32::MAX))
    }

    async fn remove_dead(&self, id: &OperationId) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM pending_operations WHERE id = ?1 AND status = 'dead'")
                .bind(id.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}
