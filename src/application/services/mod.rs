pub mod sync_orchestrator;
pub mod sync_queue_service;

pub use sync_orchestrator::{OrchestratorState, SyncOrchestrator};
pub use sync_queue_service::SyncQueueManager;
