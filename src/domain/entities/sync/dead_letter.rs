use crate::domain::value_objects::sync::{EntityId, EntityKind, OperationId, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    RetriesExhausted,
    Rejected,
    /// The server kept rejecting corrective writes with a conflict.
    ConflictUnresolved,
}

/// Published when an operation stops being retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterNotice {
    pub operation_id: OperationId,
    pub entity_kind: EntityKind,
    pub entity_id: Option<EntityId>,
    pub operation_type: OperationType,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub reason: DeadLetterReason,
    pub dead_at: DateTime<Utc>,
}
