//! Offline-first synchronization engine for the Casebook incident client.
//!
//! Local writes land in a durable mutation log first; a sync orchestrator drains the
//! log against the case-management service whenever connectivity allows.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::services::{OrchestratorState, SyncOrchestrator, SyncQueueManager};
pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casebook_lib=debug,sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
