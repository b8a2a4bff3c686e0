pub mod entity_id;
pub mod entity_kind;
pub mod operation_id;
pub mod operation_status;
pub mod operation_type;
pub mod payload;

pub use entity_id::EntityId;
pub use entity_kind::EntityKind;
pub use operation_id::OperationId;
pub use operation_status::OperationStatus;
pub use operation_type::OperationType;
pub use payload::OperationPayload;
