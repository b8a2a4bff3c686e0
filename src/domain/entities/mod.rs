pub mod sync;

pub use sync::{
    DeadLetterNotice, DeadLetterReason, DrainReport, DrainSkipReason, EntityGroupKey,
    EntitySnapshot, PendingOperation, PendingOperationDraft,
};
