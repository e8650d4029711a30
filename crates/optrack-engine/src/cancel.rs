//! Cooperative cancellation of tracked operations.

use std::sync::Arc;

use tracing::{debug, info, warn};

use optrack_core::{Operation, OperationError, OperationId};

use crate::registry::OperationRegistry;
use crate::resolver::StatusResolver;

/// Cancels operations locally and asks the remote to stop them.
#[derive(Clone)]
pub struct Canceller {
    registry: Arc<OperationRegistry>,
    resolver: Arc<dyn StatusResolver>,
}

impl Canceller {
    /// Create a new Canceller.
    pub fn new(registry: Arc<OperationRegistry>, resolver: Arc<dyn StatusResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Cancel an active operation.
    ///
    /// The `Cancelled` status is committed right away, which stops the
    /// watcher and rejects every waiter. The remote cancel request runs in
    /// the background and its outcome is only logged.
    pub async fn cancel(&self, id: &OperationId) -> Result<Operation, OperationError> {
        let operation = self
            .registry
            .mutate(id, |op| {
                if op.is_terminal() {
                    return Err(OperationError::InvalidState {
                        id: op.id.clone(),
                        status: op.status,
                        action: "cancel",
                    });
                }
                op.cancel()?;
                Ok(op.clone())
            })
            .await?;

        info!(operation_id = %id, "Operation cancelled");

        let resolver = self.resolver.clone();
        let id = id.clone();
        tokio::spawn(async move {
            match resolver.cancel_remote(&id).await {
                Ok(()) => debug!(operation_id = %id, "Remote cancellation requested"),
                Err(e) => warn!(operation_id = %id, error = %e, "Remote cancellation failed"),
            }
        });

        Ok(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverError;
    use crate::testing::ScriptedResolver;
    use optrack_core::{OperationDefinition, OperationStatus, RawStatus};
    use std::time::Duration;
    use tokio::sync::broadcast;

    async fn setup(
        resolver: Arc<ScriptedResolver>,
    ) -> (Canceller, Arc<OperationRegistry>, OperationId) {
        let (tx, _) = broadcast::channel(16);
        let registry = Arc::new(OperationRegistry::new(tx));
        let op = registry
            .create(
                OperationDefinition::new("query", "mdx"),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        (Canceller::new(registry.clone(), resolver), registry, op.id)
    }

    #[tokio::test]
    async fn test_cancel_pending_operation() {
        let resolver = ScriptedResolver::always(RawStatus::new("Pending"));
        let (canceller, registry, id) = setup(resolver.clone()).await;

        let op = canceller.cancel(&id).await.unwrap();
        assert_eq!(op.status, OperationStatus::Cancelled);
        assert!(op.ended_at.is_some());
        assert_eq!(
            registry.get(&id).await.unwrap().status,
            OperationStatus::Cancelled
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(resolver.cancels(), 1);
    }

    #[tokio::test]
    async fn test_cancel_terminal_is_invalid_state() {
        let resolver = ScriptedResolver::always(RawStatus::new("Pending"));
        let (canceller, registry, id) = setup(resolver).await;
        registry
            .mutate(&id, |op| op.complete(serde_json::json!(1)))
            .await
            .unwrap();

        let err = canceller.cancel(&id).await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::InvalidState {
                status: OperationStatus::Completed,
                action: "cancel",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_is_not_found() {
        let resolver = ScriptedResolver::always(RawStatus::new("Pending"));
        let (canceller, _registry, _id) = setup(resolver).await;
        let err = canceller.cancel(&OperationId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, OperationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remote_cancel_failure_is_ignored() {
        let resolver = ScriptedResolver::always(RawStatus::new("Running"))
            .with_cancel_error(ResolverError::Rejected("not allowed".into()));
        let (canceller, registry, id) = setup(resolver.clone()).await;

        canceller.cancel(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(resolver.cancels(), 1);
        assert_eq!(
            registry.get(&id).await.unwrap().status,
            OperationStatus::Cancelled
        );
    }
}
