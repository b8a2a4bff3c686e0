use crate::domain::entities::sync::{EntitySnapshot, PendingOperation};
use async_trait::async_trait;

/// Closed set of outcomes for a single remote attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// Write accepted. Carries the server's copy when the response included one.
    Success(Option<EntitySnapshot>),
    /// The entity changed on the server since the operation's baseline.
    Conflict(EntitySnapshot),
    /// Timeouts, connection resets, 5xx.
    RetryableError(String),
    /// Validation and other 4xx rejections; retrying cannot help.
    PermanentError {
        status: Option<u16>,
        message: String,
    },
}

impl RemoteOutcome {
    pub fn permanent(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::PermanentError {
            status,
            message: message.into(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::RetryableError(message.into())
    }

    pub fn label(&self) -> &'static str {
        match self {
            RemoteOutcome::Success(_) => "success",
            RemoteOutcome::Conflict(_) => "conflict",
            RemoteOutcome::RetryableError(_) => "retryable_error",
            RemoteOutcome::PermanentError { .. } => "permanent_error",
        }
    }
}

/// One network round trip per call. Implementations never retry internally and must
/// send the operation id as the idempotency key.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    async fn send(&self, operation: &PendingOperation) -> RemoteOutcome;
}
