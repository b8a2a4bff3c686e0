pub mod connectivity;
pub mod mutation_log;
pub mod remote_sync;
pub mod snapshot_store;
