pub mod sync;

pub use sync::{
    EntityId, EntityKind, OperationId, OperationPayload, OperationStatus, OperationType,
};
