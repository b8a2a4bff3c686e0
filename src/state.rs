use crate::application::ports::connectivity::ConnectivityMonitor;
use crate::application::services::{SyncOrchestrator, SyncQueueManager};
use crate::domain::sync::RetryPolicy;
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::sync::{
    HttpRemoteSyncClient, SharedConnectivity, SqliteMutationLog, SqliteSnapshotStore,
};
use crate::shared::config::AppConfig;
use std::sync::Arc;

/// Composition root. Everything the client shell needs is reachable from here.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Arc<ConnectionPool>,
    pub connectivity: SharedConnectivity,
    pub sync_queue: Arc<SyncQueueManager>,
    pub orchestrator: SyncOrchestrator,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(AppConfig::from_env()).await
    }

    pub async fn with_config(config: AppConfig) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

        let db_pool = Arc::new(ConnectionPool::new(&config.database).await?);
        db_pool.migrate().await?;

        let pool = db_pool.get_pool().clone();
        let mutation_log = Arc::new(SqliteMutationLog::new(pool.clone()));
        let snapshots = Arc::new(SqliteSnapshotStore::new(pool));
        let remote = Arc::new(
            HttpRemoteSyncClient::new(&config.remote.base_url, config.remote.timeout())
                .map_err(|e| anyhow::anyhow!("Failed to create remote client: {}", e))?,
        );

        // Starts offline until the platform layer reports reachability.
        let connectivity = SharedConnectivity::new(false);
        let monitor: Arc<dyn ConnectivityMonitor> = Arc::new(connectivity.clone());

        let policy = RetryPolicy::new(
            config.sync.base_delay(),
            config.sync.max_delay(),
            config.sync.max_retry,
        );
        let sync_queue = Arc::new(
            SyncQueueManager::new(mutation_log, remote, monitor.clone(), snapshots)
                .with_retry_policy(policy)
                .with_workers(config.sync.workers)
                .with_request_timeout(config.remote.timeout()),
        );
        sync_queue.recover_interrupted().await?;

        let orchestrator = SyncOrchestrator::new(sync_queue.clone(), monitor);
        if config.sync.auto_sync {
            orchestrator.start_periodic(config.sync.interval())?;
        }

        tracing::info!(
            target: "sync::orchestrator",
            database = %config.database.url,
            remote = %config.remote.base_url,
            auto_sync = config.sync.auto_sync,
            "sync engine initialised"
        );

        Ok(Self {
            config,
            db_pool,
            connectivity,
            sync_queue,
            orchestrator,
        })
    }

    pub async fn shutdown(&self) {
        self.orchestrator.stop();
        self.db_pool.close().await;
    }
}
