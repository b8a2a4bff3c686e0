pub mod dead_letter;
pub mod drain_report;
pub mod entity_snapshot;
pub mod pending_operation;

pub use dead_letter::{DeadLetterNotice, DeadLetterReason};
pub use drain_report::{DrainReport, DrainSkipReason};
pub use entity_snapshot::EntitySnapshot;
pub use pending_operation::{EntityGroupKey, GroupTarget, PendingOperation, PendingOperationDraft};
