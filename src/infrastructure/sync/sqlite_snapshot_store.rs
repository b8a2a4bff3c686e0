use super::mappers::entity_snapshot_from_row;
use super::rows::EntitySnapshotRow;
use crate::application::ports::snapshot_store::EntitySnapshotStore;
use crate::domain::entities::sync::EntitySnapshot;
use crate::domain::value_objects::sync::{EntityId, EntityKind};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

pub struct SqliteSnapshotStore {
    pool: Pool<Sqlite>,
}

impl SqliteSnapshotStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitySnapshotStore for SqliteSnapshotStore {
    async fn get(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Option<EntitySnapshot>, AppError> {
        let row = sqlx::query_as::<_, EntitySnapshotRow>(
            r#"
            SELECT entity_kind, entity_id, fields, local_version, server_version, updated_at
            FROM entity_snapshots
            WHERE entity_kind = ?1 AND entity_id = ?2
            "#,
        )
        .bind(entity_kind.as_str())
        .bind(entity_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(entity_snapshot_from_row).transpose()
    }

    async fn put(&self, snapshot: &EntitySnapshot) -> Result<(), AppError> {
        let Some(entity_id) = snapshot.entity_id.as_ref() else {
            tracing::debug!(
                target: "sync::store",
                entity_kind = %snapshot.entity_kind,
                "skipping snapshot without entity id"
            );
            return Ok(());
        };
        let fields = serde_json::to_string(&snapshot.fields)?;

        sqlx::query(
            r#"
            INSERT INTO entity_snapshots (
                entity_kind, entity_id, fields, local_version, server_version, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(entity_kind, entity_id) DO UPDATE SET
                fields = excluded.fields,
                local_version = excluded.local_version,
                server_version = excluded.server_version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.entity_kind.as_str())
        .bind(entity_id.as_str())
        .bind(&fields)
        .bind(snapshot.local_version)
        .bind(snapshot.server_version)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|err| AppError::Storage(err.to_string()))?;

        Ok(())
    }

    async fn delete(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM entity_snapshots WHERE entity_kind = ?1 AND entity_id = ?2")
            .bind(entity_kind.as_str())
            .bind(entity_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
