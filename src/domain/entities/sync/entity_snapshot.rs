use crate::domain::value_objects::sync::{EntityId, EntityKind, OperationPayload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cached copy of a domain entity (report, witness, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySnapshot {
    pub entity_kind: EntityKind,
    pub entity_id: Option<EntityId>,
    pub fields: Map<String, Value>,
    /// Last-modified marker in epoch milliseconds. Compared by the conflict resolver.
    pub local_version: i64,
    /// Server revision, sent back as the `If-Match` precondition. Never compared
    /// against `local_version`.
    #[serde(default)]
    pub server_version: Option<i64>,
}

impl EntitySnapshot {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: Option<EntityId>,
        fields: Map<String, Value>,
        local_version: i64,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            fields,
            local_version,
            server_version: None,
        }
    }

    pub fn with_server_version(mut self, server_version: Option<i64>) -> Self {
        self.server_version = server_version;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Overlays the written fields of an operation onto this snapshot.
    pub fn apply_payload(&mut self, payload: &OperationPayload, modified_at: i64) {
        for (key, value) in payload.fields() {
            self.fields.insert(key.clone(), value.clone());
        }
        self.local_version = self.local_version.max(modified_at);
    }
}
