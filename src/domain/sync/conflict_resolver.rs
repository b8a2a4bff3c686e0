//! Field-level merge of a local snapshot against the server's copy.
//!
//! The server is authoritative for workflow state; user-editable text follows
//! emptiness first, then recency; filing timestamps never move forward.

use crate::domain::entities::sync::EntitySnapshot;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Identifier and workflow fields. Remote value always wins.
    ServerOwned,
    /// Free text. Non-empty beats empty, otherwise later modification wins.
    Editable,
    /// Filing timestamps. The earliest value wins.
    EarliestTimestamp,
}

#[derive(Debug, Clone)]
pub struct FieldPolicyTable {
    policies: HashMap<String, FieldPolicy>,
    fallback: FieldPolicy,
}

const SERVER_OWNED_FIELDS: &[&str] = &[
    "id",
    "status",
    "assignment",
    "assigned_to",
    "assignedTo",
    "assignee",
    "role",
];
const EDITABLE_FIELDS: &[&str] = &["narrative", "address", "description"];
const FILED_AT_FIELDS: &[&str] = &["filed_at", "filedAt"];

impl FieldPolicyTable {
    pub fn empty(fallback: FieldPolicy) -> Self {
        Self {
            policies: HashMap::new(),
            fallback,
        }
    }

    pub fn with_policy(mut self, field: impl Into<String>, policy: FieldPolicy) -> Self {
        self.policies.insert(field.into(), policy);
        self
    }

    pub fn policy_for(&self, field: &str) -> FieldPolicy {
        self.policies.get(field).copied().unwrap_or(self.fallback)
    }
}

impl Default for FieldPolicyTable {
    fn default() -> Self {
        let table = Self::empty(FieldPolicy::Editable);
        let table = SERVER_OWNED_FIELDS.iter().fold(table, |table, field| {
            table.with_policy(*field, FieldPolicy::ServerOwned)
        });
        let table = EDITABLE_FIELDS
            .iter()
            .fold(table, |table, field| table.with_policy(*field, FieldPolicy::Editable));
        FILED_AT_FIELDS.iter().fold(table, |table, field| {
            table.with_policy(*field, FieldPolicy::EarliestTimestamp)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub merged: EntitySnapshot,
    pub conflicted: bool,
    changed_fields: Vec<String>,
}

impl Resolution {
    /// Names of fields whose merged value differs from the remote snapshot.
    pub fn changed_fields(&self) -> &[String] {
        &self.changed_fields
    }

    /// Fields the server does not have yet; payload for a corrective write.
    pub fn corrective_fields(&self) -> Map<String, Value> {
        self.changed_fields
            .iter()
            .map(|name| {
                let value = self.merged.fields.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    policies: FieldPolicyTable,
}

impl ConflictResolver {
    pub fn new(policies: FieldPolicyTable) -> Self {
        Self { policies }
    }

    pub fn resolve(&self, local: &EntitySnapshot, remote: &EntitySnapshot) -> Resolution {
        let names: BTreeSet<&String> = local.fields.keys().chain(remote.fields.keys()).collect();

        let mut merged_fields = Map::new();
        let mut changed_fields = Vec::new();

        for name in names {
            let local_value = local.fields.get(name.as_str());
            let remote_value = remote.fields.get(name.as_str());

            let chosen = match self.policies.policy_for(name) {
                FieldPolicy::ServerOwned => remote_value.cloned(),
                FieldPolicy::Editable => choose_editable(
                    local_value,
                    remote_value,
                    local.local_version,
                    remote.local_version,
                ),
                FieldPolicy::EarliestTimestamp => choose_earliest(
                    local_value,
                    remote_value,
                    local.local_version,
                    remote.local_version,
                ),
            };

            if chosen.as_ref() != remote_value {
                changed_fields.push(name.clone());
            }
            if let Some(value) = chosen {
                merged_fields.insert(name.clone(), value);
            }
        }

        let merged = EntitySnapshot::new(
            remote.entity_kind.clone(),
            remote.entity_id.clone().or_else(|| local.entity_id.clone()),
            merged_fields,
            local.local_version.max(remote.local_version),
        )
        .with_server_version(remote.server_version.or(local.server_version));

        Resolution {
            merged,
            conflicted: !changed_fields.is_empty(),
            changed_fields,
        }
    }
}

fn choose_editable(
    local: Option<&Value>,
    remote: Option<&Value>,
    local_version: i64,
    remote_version: i64,
) -> Option<Value> {
    match (is_empty(local), is_empty(remote)) {
        (false, true) => local.cloned(),
        (true, _) => remote.cloned(),
        (false, false) if local_version > remote_version => local.cloned(),
        (false, false) => remote.cloned(),
    }
}

fn choose_earliest(
    local: Option<&Value>,
    remote: Option<&Value>,
    local_version: i64,
    remote_version: i64,
) -> Option<Value> {
    match (as_number(local), as_number(remote)) {
        (Some(l), Some(r)) if l < r => local.cloned(),
        (Some(_), Some(_)) => remote.cloned(),
        (Some(_), None) => local.cloned(),
        (None, Some(_)) => remote.cloned(),
        (None, None) => choose_editable(local, remote, local_version, remote_version),
    }
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// Absent, null, blank strings and empty containers all count as empty.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}
