pub mod connectivity;
pub mod http_remote_client;
mod mappers;
pub mod metrics;
mod rows;
pub mod sqlite_mutation_log;
pub mod sqlite_snapshot_store;

pub use connectivity::SharedConnectivity;
pub use http_remote_client::{HttpRemoteSyncClient, RemoteClientError};
pub use metrics::{SyncMetrics, SyncMetricsSnapshot};
pub use sqlite_mutation_log::SqliteMutationLog;
pub use sqlite_snapshot_store::SqliteSnapshotStore;
