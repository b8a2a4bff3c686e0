use crate::domain::entities::sync::EntitySnapshot;
use crate::domain::value_objects::sync::{EntityId, EntityKind};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// Local cache of domain entities that sync passes reconcile against.
#[async_trait]
pub trait EntitySnapshotStore: Send + Sync {
    async fn get(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Option<EntitySnapshot>, AppError>;

    /// Inserts or replaces. Snapshots without an id are ignored.
    async fn put(&self, snapshot: &EntitySnapshot) -> Result<(), AppError>;

    async fn delete(&self, entity_kind: &EntityKind, entity_id: &EntityId)
    -> Result<(), AppError>;
}
