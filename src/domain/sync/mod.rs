pub mod backoff;
pub mod conflict_resolver;

pub use backoff::RetryPolicy;
pub use conflict_resolver::{ConflictResolver, FieldPolicy, FieldPolicyTable, Resolution};
