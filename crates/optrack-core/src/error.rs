//! Core domain errors.

use std::time::Duration;

use thiserror::Error;

use crate::{OperationId, OperationStatus};

/// Errors surfaced by operation tracking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    /// No operation with this id is tracked.
    #[error("Operation not found: {0}")]
    NotFound(OperationId),

    /// Invalid input (missing type/name, result on a non-completed status, ...).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The requested action is not legal in the operation's current status.
    #[error("Operation {id} is {status}, cannot {action}")]
    InvalidState {
        id: OperationId,
        status: OperationStatus,
        action: &'static str,
    },

    /// The caller's own wait deadline elapsed while the operation was still active.
    #[error("Timed out after {waited:?} waiting for operation {id}")]
    WaitTimeout { id: OperationId, waited: Duration },

    /// The operation itself reached the `TimedOut` status.
    #[error("Operation {id} timed out")]
    TimedOut { id: OperationId },

    /// The operation was cancelled.
    #[error("Operation {0} was cancelled")]
    Cancelled(OperationId),

    /// The remote side reported failure.
    #[error("Operation {id} failed: {message}")]
    Failed { id: OperationId, message: String },

    /// The tracker was shut down while the caller was waiting.
    #[error("Operation tracker is shut down")]
    Shutdown,
}

impl OperationError {
    /// True for both the caller's wait timeout and the operation's own timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout { .. } | Self::TimedOut { .. })
    }
}
