//! REST adapter for the case-management service.
//!
//! Routes: `POST {base}/{kind}`, `PUT {base}/{kind}/{id}`, `DELETE {base}/{kind}/{id}`.
//! Every request carries the operation id as `Idempotency-Key` and, when the write was
//! based on a known version, an `If-Match` precondition.

use crate::application::ports::remote_sync::{RemoteOutcome, RemoteSyncClient};
use crate::domain::entities::sync::{EntitySnapshot, PendingOperation};
use crate::domain::value_objects::sync::{EntityId, OperationType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::header::{HeaderValue, IF_MATCH};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";
const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Error)]
pub enum RemoteClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid base url: {0}")]
    InvalidBaseUrl(String),

    #[error("Missing entity id for {0}")]
    MissingEntityId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Conflict,
    Retryable,
    Permanent,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        409 | 412 => StatusClass::Conflict,
        408 | 425 | 429 => StatusClass::Retryable,
        500..=599 => StatusClass::Retryable,
        _ => StatusClass::Permanent,
    }
}

/// Wire shape of an entity in responses and conflict bodies. `version` is the
/// revision used for `If-Match`; `updated_at` is when the server copy last changed.
#[derive(Debug, Deserialize)]
struct RemoteEntityDto {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default, alias = "updatedAt")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl RemoteEntityDto {
    fn into_snapshot(self, operation: &PendingOperation) -> EntitySnapshot {
        let entity_id = self
            .id
            .and_then(|value| match value {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .and_then(|raw| EntityId::new(raw).ok())
            .or_else(|| operation.entity_id.clone());

        // Unknown modification time sorts before any local edit.
        let modified_at = self
            .updated_at
            .map(|at| at.timestamp_millis())
            .unwrap_or_default();

        EntitySnapshot::new(operation.entity_kind.clone(), entity_id, self.fields, modified_at)
            .with_server_version(self.version)
    }
}

#[derive(Debug, Clone)]
pub struct HttpRemoteSyncClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteSyncClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteClientError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|err| RemoteClientError::InvalidBaseUrl(format!("{trimmed}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteClientError::InvalidBaseUrl(trimmed.to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn operation_url(&self, operation: &PendingOperation) -> Result<Url, RemoteClientError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteClientError::InvalidBaseUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push(operation.entity_kind.as_str());

            if operation.operation_type != OperationType::Create {
                let entity_id = operation.entity_id.as_ref().ok_or_else(|| {
                    RemoteClientError::MissingEntityId(format!(
                        "{} {}",
                        operation.operation_type, operation.entity_kind
                    ))
                })?;
                segments.push(entity_id.as_str());
            }
        }
        Ok(url)
    }

    async fn dispatch(&self, operation: &PendingOperation) -> Result<RemoteOutcome, RemoteClientError> {
        let url = self.operation_url(operation)?;

        let mut request = match operation.operation_type {
            OperationType::Create => self.client.post(url).json(operation.payload.fields()),
            OperationType::Update => self.client.put(url).json(operation.payload.fields()),
            OperationType::Delete => self.client.delete(url),
        };
        request = request.header(IDEMPOTENCY_KEY, operation.idempotency_key());
        if let Some(version) = operation.base_version {
            request = request.header(IF_MATCH, HeaderValue::from(version));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            target: "sync::remote",
            operation_id = %operation.id,
            status,
            "remote responded"
        );

        Ok(interpret_response(operation, status, &body))
    }
}

/// Maps a status code and raw body onto the outcome set.
pub fn interpret_response(operation: &PendingOperation, status: u16, body: &str) -> RemoteOutcome {
    match classify_status(status) {
        StatusClass::Success => {
            if body.trim().is_empty() {
                return RemoteOutcome::Success(None);
            }
            match serde_json::from_str::<RemoteEntityDto>(body) {
                Ok(dto) => RemoteOutcome::Success(Some(dto.into_snapshot(operation))),
                Err(err) => {
                    tracing::debug!(
                        target: "sync::remote",
                        operation_id = %operation.id,
                        error = %err,
                        "success body is not an entity"
                    );
                    RemoteOutcome::Success(None)
                }
            }
        }
        StatusClass::Conflict => match serde_json::from_str::<RemoteEntityDto>(body) {
            Ok(dto) => RemoteOutcome::Conflict(dto.into_snapshot(operation)),
            Err(err) => RemoteOutcome::retryable(format!(
                "HTTP {status}: unreadable conflict body: {err}"
            )),
        },
        StatusClass::Retryable => {
            RemoteOutcome::retryable(format!("HTTP {status}: {}", preview(body)))
        }
        StatusClass::Permanent => {
            RemoteOutcome::permanent(Some(status), format!("HTTP {status}: {}", preview(body)))
        }
    }
}

fn preview(body: &str) -> String {
    let mut preview = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
    if body.trim().chars().count() > MAX_ERROR_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}

#[async_trait]
impl RemoteSyncClient for HttpRemoteSyncClient {
    async fn send(&self, operation: &PendingOperation) -> RemoteOutcome {
        match self.dispatch(operation).await {
            Ok(outcome) => outcome,
            Err(RemoteClientError::MissingEntityId(message)) => {
                RemoteOutcome::permanent(None, format!("Missing entity id for {message}"))
            }
            Err(err) => {
                tracing::warn!(
                    target: "sync::remote",
                    operation_id = %operation.id,
                    error = %err,
                    "request failed before a response"
                );
                RemoteOutcome::retryable(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::sync::{
        EntityKind, OperationId, OperationPayload, OperationStatus,
    };
    use chrono::Utc;
    use serde_json::json;

    fn operation(operation_type: OperationType, entity_id: Option<&str>) -> PendingOperation {
        PendingOperation {
            id: OperationId::generate(),
            sequence: 1,
            entity_kind: EntityKind::report(),
            entity_id: entity_id.map(|id| EntityId::new(id.into()).unwrap()),
            operation_type,
            payload: OperationPayload::new(json!({"narrative": "x"})).unwrap(),
            base_version: Some(7),
            status: OperationStatus::InFlight,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            next_attempt_at: None,
            last_error: None,
        }
    }

    fn client() -> HttpRemoteSyncClient {
        HttpRemoteSyncClient::new("http://localhost:8080/api/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn routes_follow_operation_type() {
        let client = client();
        let create = client
            .operation_url(&operation(OperationType::Create, None))
            .unwrap();
        assert_eq!(create.as_str(), "http://localhost:8080/api/report");

        let update = client
            .operation_url(&operation(OperationType::Update, Some("42")))
            .unwrap();
        assert_eq!(update.as_str(), "http://localhost:8080/api/report/42");
    }

    #[test]
    fn entity_ids_are_percent_encoded() {
        let url = client()
            .operation_url(&operation(OperationType::Delete, Some("a b")))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/report/a%20b");
    }

    #[test]
    fn update_without_id_cannot_be_routed() {
        let result = client().operation_url(&operation(OperationType::Update, None));
        assert!(matches!(result, Err(RemoteClientError::MissingEntityId(_))));
    }

    #[test]
    fn rejects_relative_base_url() {
        assert!(HttpRemoteSyncClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(201), StatusClass::Success);
        assert_eq!(classify_status(409), StatusClass::Conflict);
        assert_eq!(classify_status(412), StatusClass::Conflict);
        assert_eq!(classify_status(429), StatusClass::Retryable);
        assert_eq!(classify_status(503), StatusClass::Retryable);
        assert_eq!(classify_status(400), StatusClass::Permanent);
        assert_eq!(classify_status(404), StatusClass::Permanent);
    }

    #[test]
    fn conflict_body_becomes_remote_snapshot() {
        let op = operation(OperationType::Update, Some("42"));
        let body = json!({
            "id": 42,
            "version": 9,
            "updated_at": "2025-06-01T12:00:00Z",
            "fields": {"status": "ONGOING"}
        })
        .to_string();

        let RemoteOutcome::Conflict(remote) = interpret_response(&op, 409, &body) else {
            panic!("expected conflict");
        };
        assert_eq!(remote.entity_id.as_ref().map(|id| id.as_str()), Some("42"));
        assert_eq!(remote.server_version, Some(9));
        assert_eq!(remote.local_version, 1_748_779_200_000);
        assert_eq!(remote.field("status"), Some(&json!("ONGOING")));
    }

    #[test]
    fn missing_modification_time_sorts_first() {
        let op = operation(OperationType::Update, Some("42"));
        let body = json!({"id": "42", "version": 3, "fields": {}}).to_string();

        let RemoteOutcome::Conflict(remote) = interpret_response(&op, 412, &body) else {
            panic!("expected conflict");
        };
        assert_eq!(remote.local_version, 0);
        assert_eq!(remote.server_version, Some(3));
    }

    #[test]
    fn unreadable_conflict_is_retryable() {
        let op = operation(OperationType::Update, Some("42"));
        assert!(matches!(
            interpret_response(&op, 409, "<html>"),
            RemoteOutcome::RetryableError(_)
        ));
    }

    #[test]
    fn validation_rejection_is_permanent() {
        let op = operation(OperationType::Create, None);
        let outcome = interpret_response(&op, 400, r#"{"error":"narrative required"}"#);
        assert!(matches!(
            outcome,
            RemoteOutcome::PermanentError { status: Some(400), .. }
        ));
    }

    #[test]
    fn empty_success_body_has_no_entity() {
        let op = operation(OperationType::Delete, Some("42"));
        assert_eq!(interpret_response(&op, 204, ""), RemoteOutcome::Success(None));
    }
}
