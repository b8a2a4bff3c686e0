#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use casebook_lib::application::ports::remote_sync::{RemoteOutcome, RemoteSyncClient};
use casebook_lib::application::services::SyncQueueManager;
use casebook_lib::domain::entities::sync::{EntitySnapshot, PendingOperation};
use casebook_lib::domain::sync::RetryPolicy;
use casebook_lib::domain::value_objects::sync::{
    EntityId, EntityKind, OperationPayload, OperationType,
};
use casebook_lib::infrastructure::database::ConnectionPool;
use casebook_lib::infrastructure::sync::{
    SharedConnectivity, SqliteMutationLog, SqliteSnapshotStore,
};
use casebook_lib::shared::config::DatabaseConfig;
use chrono::Utc;
use serde_json::{Map, Value, json};

/// Injected behaviour for the next request the fake server receives.
#[derive(Debug, Clone)]
pub enum Fault {
    Retryable(String),
    Permanent(u16),
    /// The write is applied but the response never reaches the client.
    LostResponse,
    /// Reject with the given server copy, last changed at `modified_at` (epoch ms).
    Conflict {
        fields: Value,
        version: i64,
        modified_at: i64,
    },
    /// Hold the request for this long before answering normally.
    Delay(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub idempotency_key: String,
    pub entity_id: Option<String>,
    pub operation_type: OperationType,
    pub base_version: Option<i64>,
}

#[derive(Debug, Clone)]
struct StoredEntity {
    fields: Map<String, Value>,
    version: i64,
    updated_at: i64,
}

#[derive(Default)]
struct ServerState {
    entities: HashMap<(String, String), StoredEntity>,
    replies: HashMap<String, RemoteOutcome>,
    faults: VecDeque<Fault>,
    calls: Vec<CallRecord>,
    next_id: u64,
}

/// In-process stand-in for the case-management service. Honors idempotency keys the way
/// the real service does: a replayed key returns the first reply without re-applying.
#[derive(Default)]
pub struct FakeCaseServer {
    state: Mutex<ServerState>,
}

impl FakeCaseServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().expect("server state").faults.push_back(fault);
    }

    pub fn push_faults(&self, fault: Fault, times: usize) {
        for _ in 0..times {
            self.push_fault(fault.clone());
        }
    }

    pub fn seed(&self, kind: &str, id: &str, fields: Value, version: i64) {
        let Value::Object(fields) = fields else {
            panic!("seed fields must be an object");
        };
        self.state
            .lock()
            .expect("server state")
            .entities
            .insert(
                (kind.to_string(), id.to_string()),
                StoredEntity {
                    fields,
                    version,
                    updated_at: Utc::now().timestamp_millis(),
                },
            );
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().expect("server state").calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().expect("server state").calls.len()
    }

    pub fn entity_count(&self, kind: &str) -> usize {
        self.state
            .lock()
            .expect("server state")
            .entities
            .keys()
            .filter(|(k, _)| k == kind)
            .count()
    }

    pub fn entity(&self, kind: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .lock()
            .expect("server state")
            .entities
            .get(&(kind.to_string(), id.to_string()))
            .map(|entity| entity.fields.clone())
    }

    fn apply(state: &mut ServerState, operation: &PendingOperation) -> RemoteOutcome {
        let key = operation.idempotency_key().to_string();
        if let Some(reply) = state.replies.get(&key) {
            return reply.clone();
        }

        let kind = operation.entity_kind.as_str().to_string();
        let reply = match operation.operation_type {
            OperationType::Create => {
                state.next_id += 1;
                let id = format!("srv-{}", state.next_id);
                let entity = StoredEntity {
                    fields: operation.payload.fields().clone(),
                    version: 1,
                    updated_at: Utc::now().timestamp_millis(),
                };
                let snapshot = to_snapshot(operation, &id, &entity);
                state.entities.insert((kind, id), entity);
                RemoteOutcome::Success(Some(snapshot))
            }
            OperationType::Update => {
                let id = operation
                    .entity_id
                    .as_ref()
                    .map(|id| id.as_str().to_string())
                    .unwrap_or_default();
                let entity = state
                    .entities
                    .entry((kind, id.clone()))
                    .or_insert_with(|| StoredEntity {
                        fields: Map::new(),
                        version: 0,
                        updated_at: 0,
                    });
                for (name, value) in operation.payload.fields() {
                    entity.fields.insert(name.clone(), value.clone());
                }
                entity.version += 1;
                entity.updated_at = Utc::now().timestamp_millis();
                RemoteOutcome::Success(Some(to_snapshot(operation, &id, entity)))
            }
            OperationType::Delete => {
                if let Some(id) = &operation.entity_id {
                    state.entities.remove(&(kind, id.as_str().to_string()));
                }
                RemoteOutcome::Success(None)
            }
        };

        state.replies.insert(key, reply.clone());
        reply
    }
}

fn to_snapshot(operation: &PendingOperation, id: &str, entity: &StoredEntity) -> EntitySnapshot {
    EntitySnapshot::new(
        operation.entity_kind.clone(),
        Some(EntityId::new(id.to_string()).expect("server id")),
        entity.fields.clone(),
        entity.updated_at,
    )
    .with_server_version(Some(entity.version))
}

#[async_trait]
impl RemoteSyncClient for FakeCaseServer {
    async fn send(&self, operation: &PendingOperation) -> RemoteOutcome {
        let fault = {
            let mut state = self.state.lock().expect("server state");
            state.calls.push(CallRecord {
                idempotency_key: operation.idempotency_key().to_string(),
                entity_id: operation.entity_id.as_ref().map(|id| id.as_str().to_string()),
                operation_type: operation.operation_type,
                base_version: operation.base_version,
            });
            state.faults.pop_front()
        };

        if let Some(Fault::Delay(delay)) = &fault {
            tokio::time::sleep(*delay).await;
        }

        let mut state = self.state.lock().expect("server state");
        match fault {
            None | Some(Fault::Delay(_)) => Self::apply(&mut state, operation),
            Some(Fault::Retryable(message)) => RemoteOutcome::retryable(message),
            Some(Fault::Permanent(status)) => {
                RemoteOutcome::permanent(Some(status), format!("HTTP {status}"))
            }
            Some(Fault::LostResponse) => {
                Self::apply(&mut state, operation);
                RemoteOutcome::retryable("connection reset by peer")
            }
            Some(Fault::Conflict {
                fields,
                version,
                modified_at,
            }) => {
                let Value::Object(fields) = fields else {
                    panic!("conflict fields must be an object");
                };
                RemoteOutcome::Conflict(
                    EntitySnapshot::new(
                        operation.entity_kind.clone(),
                        operation.entity_id.clone(),
                        fields,
                        modified_at,
                    )
                    .with_server_version(Some(version)),
                )
            }
        }
    }
}

pub struct SyncHarness {
    pub pool: ConnectionPool,
    pub manager: Arc<SyncQueueManager>,
    pub server: Arc<FakeCaseServer>,
    pub connectivity: SharedConnectivity,
    pub snapshots: Arc<SqliteSnapshotStore>,
}

pub fn zero_delay_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::ZERO, Duration::ZERO, max_retries)
}

pub async fn memory_harness(policy: RetryPolicy) -> SyncHarness {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");
    build_harness(pool, FakeCaseServer::new(), policy)
}

pub async fn file_pool(dir: &Path) -> ConnectionPool {
    let config = DatabaseConfig {
        url: format!("sqlite:{}?mode=rwc", dir.join("casebook.db").display()),
        max_connections: 2,
        connection_timeout: 5,
    };
    let pool = ConnectionPool::new(&config).await.expect("file sqlite");
    pool.migrate().await.expect("migrations");
    pool
}

pub fn build_harness(
    pool: ConnectionPool,
    server: Arc<FakeCaseServer>,
    policy: RetryPolicy,
) -> SyncHarness {
    build_harness_with_timeout(pool, server, policy, Duration::from_secs(5))
}

pub fn build_harness_with_timeout(
    pool: ConnectionPool,
    server: Arc<FakeCaseServer>,
    policy: RetryPolicy,
    request_timeout: Duration,
) -> SyncHarness {
    let connectivity = SharedConnectivity::new(true);
    let snapshots = Arc::new(SqliteSnapshotStore::new(pool.get_pool().clone()));
    let manager = Arc::new(
        SyncQueueManager::new(
            Arc::new(SqliteMutationLog::new(pool.get_pool().clone())),
            server.clone(),
            Arc::new(connectivity.clone()),
            snapshots.clone(),
        )
        .with_retry_policy(policy)
        .with_workers(4)
        .with_request_timeout(request_timeout),
    );

    SyncHarness {
        pool,
        manager,
        server,
        connectivity,
        snapshots,
    }
}

pub fn report(id: &str) -> Option<EntityId> {
    Some(EntityId::new(id.to_string()).expect("entity id"))
}

pub fn payload(value: Value) -> OperationPayload {
    OperationPayload::new(value).expect("payload")
}

pub async fn enqueue_narrative(
    manager: &SyncQueueManager,
    id: &str,
    narrative: &str,
) -> casebook_lib::domain::value_objects::sync::OperationId {
    manager
        .enqueue(
            EntityKind::report(),
            report(id),
            OperationType::Update,
            payload(json!({ "narrative": narrative })),
        )
        .await
        .expect("enqueue")
}
