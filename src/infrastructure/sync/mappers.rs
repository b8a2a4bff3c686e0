use super::rows::{EntitySnapshotRow, PendingOperationRow};
use crate::domain::entities::sync::{EntitySnapshot, PendingOperation};
use crate::domain::value_objects::sync::{
    EntityId, EntityKind, OperationId, OperationPayload, OperationStatus, OperationType,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::DeserializationError(format!("Invalid timestamp: {millis}")))
}

fn optional_millis(value: Option<i64>) -> Result<Option<DateTime<Utc>>, AppError> {
    value.map(millis_to_datetime).transpose()
}

fn invalid(err: String) -> AppError {
    AppError::DeserializationError(err)
}

pub fn pending_operation_from_row(row: PendingOperationRow) -> Result<PendingOperation, AppError> {
    let payload = OperationPayload::from_json_str(&row.payload).map_err(invalid)?;
    let retry_count = u32::try_from(row.retry_count)
        .map_err(|_| invalid(format!("Invalid retry count: {}", row.retry_count)))?;

    Ok(PendingOperation {
        id: OperationId::new(row.id).map_err(invalid)?,
        sequence: row.sequence,
        entity_kind: EntityKind::new(row.entity_kind).map_err(invalid)?,
        entity_id: row.entity_id.map(EntityId::new).transpose().map_err(invalid)?,
        operation_type: OperationType::parse(&row.operation_type).map_err(invalid)?,
        payload,
        base_version: row.base_version,
        status: OperationStatus::parse(&row.status).map_err(invalid)?,
        retry_count,
        created_at: millis_to_datetime(row.created_at)?,
        last_attempt_at: optional_millis(row.last_attempt_at)?,
        next_attempt_at: optional_millis(row.next_attempt_at)?,
        last_error: row.last_error,
    })
}

pub fn entity_snapshot_from_row(row: EntitySnapshotRow) -> Result<EntitySnapshot, AppError> {
    let fields: Map<String, Value> = match serde_json::from_str(&row.fields)
        .map_err(|err| invalid(format!("Invalid snapshot fields: {err}")))?
    {
        Value::Object(map) => map,
        _ => return Err(invalid("Snapshot fields must be a JSON object".to_string())),
    };

    Ok(EntitySnapshot::new(
        EntityKind::new(row.entity_kind).map_err(invalid)?,
        Some(EntityId::new(row.entity_id).map_err(invalid)?),
        fields,
        row.local_version,
    )
    .with_server_version(row.server_version))
}
