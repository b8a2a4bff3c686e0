use crate::domain::value_objects::sync::{
    EntityId, EntityKind, OperationId, OperationPayload, OperationStatus, OperationType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally originated write awaiting confirmation from the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingOperation {
    pub id: OperationId,
    /// Storage-assigned insertion order, breaks `created_at` ties.
    pub sequence: i64,
    pub entity_kind: EntityKind,
    pub entity_id: Option<EntityId>,
    pub operation_type: OperationType,
    pub payload: OperationPayload,
    /// Entity version the write was based on, sent as a precondition.
    pub base_version: Option<i64>,
    pub status: OperationStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PendingOperation {
    pub fn group_key(&self) -> EntityGroupKey {
        EntityGroupKey::for_operation(self)
    }

    /// Whether a drain pass may attempt this operation at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>, max_retries: u32) -> bool {
        match self.status {
            OperationStatus::Pending => true,
            OperationStatus::Failed => {
                self.retry_count < max_retries
                    && self.next_attempt_at.map_or(true, |at| at <= now)
            }
            _ => false,
        }
    }

    pub fn idempotency_key(&self) -> &str {
        self.id.as_str()
    }
}

/// Serialization unit for drain passes. Creates without a server id form their own group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityGroupKey {
    pub entity_kind: EntityKind,
    pub target: GroupTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupTarget {
    Entity(EntityId),
    Unassigned(OperationId),
}

impl EntityGroupKey {
    pub fn for_operation(operation: &PendingOperation) -> Self {
        let target = match &operation.entity_id {
            Some(id) => GroupTarget::Entity(id.clone()),
            None => GroupTarget::Unassigned(operation.id.clone()),
        };
        Self {
            entity_kind: operation.entity_kind.clone(),
            target,
        }
    }
}

/// Input to `enqueue`; the log assigns id, sequence and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingOperationDraft {
    pub entity_kind: EntityKind,
    pub entity_id: Option<EntityId>,
    pub operation_type: OperationType,
    pub payload: OperationPayload,
    pub base_version: Option<i64>,
}

impl PendingOperationDraft {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: Option<EntityId>,
        operation_type: OperationType,
        payload: OperationPayload,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            operation_type,
            payload,
            base_version: None,
        }
    }

    pub fn with_base_version(mut self, base_version: Option<i64>) -> Self {
        self.base_version = base_version;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.operation_type {
            OperationType::Update | OperationType::Delete if self.entity_id.is_none() => Err(
                format!("{} of {} requires an entity id", self.operation_type, self.entity_kind),
            ),
            OperationType::Update if self.payload.is_empty() => {
                Err("Update payload cannot be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn operation(status: OperationStatus, retry_count: u32) -> PendingOperation {
        PendingOperation {
            id: OperationId::generate(),
            sequence: 1,
            entity_kind: EntityKind::report(),
            entity_id: Some(EntityId::new("42".into()).unwrap()),
            operation_type: OperationType::Update,
            payload: OperationPayload::new(json!({"narrative": "x"})).unwrap(),
            base_version: None,
            status,
            retry_count,
            created_at: Utc::now(),
            last_attempt_at: None,
            next_attempt_at: None,
            last_error: None,
        }
    }

    #[test]
    fn failed_operation_waits_for_backoff() {
        let now = Utc::now();
        let mut op = operation(OperationStatus::Failed, 1);
        op.next_attempt_at = Some(now + Duration::seconds(30));
        assert!(!op.is_eligible(now, 5));
        assert!(op.is_eligible(now + Duration::seconds(31), 5));
    }

    #[test]
    fn exhausted_or_terminal_operations_are_not_eligible() {
        let now = Utc::now();
        assert!(!operation(OperationStatus::Failed, 5).is_eligible(now, 5));
        assert!(!operation(OperationStatus::Dead, 0).is_eligible(now, 5));
        assert!(!operation(OperationStatus::InFlight, 0).is_eligible(now, 5));
        assert!(operation(OperationStatus::Pending, 0).is_eligible(now, 5));
    }

    #[test]
    fn creates_without_id_get_private_groups() {
        let mut a = operation(OperationStatus::Pending, 0);
        a.entity_id = None;
        let mut b = operation(OperationStatus::Pending, 0);
        b.entity_id = None;
        assert_ne!(a.group_key(), b.group_key());

        let c = operation(OperationStatus::Pending, 0);
        let d = operation(OperationStatus::Pending, 0);
        assert_eq!(c.group_key(), d.group_key());
    }

    #[test]
    fn update_draft_requires_entity_id() {
        let draft = PendingOperationDraft::new(
            EntityKind::report(),
            None,
            OperationType::Update,
            OperationPayload::new(json!({"narrative": "x"})).unwrap(),
        );
        assert!(draft.validate().is_err());
    }
}
