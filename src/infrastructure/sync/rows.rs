use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingOperationRow {
    pub sequence: i64,
    pub id: String,
    pub entity_kind: String,
    pub entity_id: Option<String>,
    pub operation_type: String,
    pub payload: String,
    pub base_version: Option<i64>,
    pub status: String,
    pub retry_count: i64,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    pub next_attempt_at: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntitySnapshotRow {
    pub entity_kind: String,
    pub entity_id: String,
    pub fields: String,
    pub local_version: i64,
    pub server_version: Option<i64>,
    pub updated_at: i64,
}
