//! The seam to the remote server's status endpoint.

use async_trait::async_trait;
use thiserror::Error;

use optrack_core::{OperationId, RawStatus};

/// Errors a [`StatusResolver`] may report.
///
/// These never reach callers of the tracker: a failed fetch keeps the cached
/// status and is retried on the next tick.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// The status endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered but refused the request.
    #[error("rejected by remote: {0}")]
    Rejected(String),
}

/// Supplies raw status for remote operations.
///
/// Implement this over whatever client talks to the remote server.
#[async_trait]
pub trait StatusResolver: Send + Sync {
    /// Fetch the current raw status of an operation.
    async fn fetch_status(&self, id: &OperationId) -> Result<RawStatus, ResolverError>;

    /// Ask the remote to stop an operation. Best effort; the default does nothing.
    async fn cancel_remote(&self, _id: &OperationId) -> Result<(), ResolverError> {
        Ok(())
    }
}
