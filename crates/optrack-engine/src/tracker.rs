//! Public entry point: create, wait on, monitor, cancel and clean up operations.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use optrack_core::{
    Operation, OperationDefinition, OperationError, OperationEvent, OperationId, OperationStatus,
};

use crate::cancel::Canceller;
use crate::config::EngineConfig;
use crate::registry::OperationRegistry;
use crate::resolver::StatusResolver;
use crate::sweeper::CleanupSweeper;
use crate::watcher::Watcher;

/// Tracks remote long-running operations by polling their status.
///
/// Cloning is cheap; clones share the same registry and watchers.
#[derive(Clone)]
pub struct OperationTracker {
    config: EngineConfig,
    registry: Arc<OperationRegistry>,
    resolver: Arc<dyn StatusResolver>,
    canceller: Canceller,
    sweeper: CleanupSweeper,
    events: broadcast::Sender<OperationEvent>,
    shutdown: CancellationToken,
}

impl OperationTracker {
    /// Create a tracker polling `resolver`.
    pub fn new(resolver: Arc<dyn StatusResolver>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let registry = Arc::new(
            OperationRegistry::new(events.clone()).with_tick_capacity(config.tick_capacity),
        );
        Self {
            canceller: Canceller::new(registry.clone(), resolver.clone()),
            sweeper: CleanupSweeper::new(registry.clone()),
            config,
            registry,
            resolver,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// The tracker's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Start tracking an already-submitted remote operation.
    pub async fn create_operation(
        &self,
        definition: OperationDefinition,
    ) -> Result<OperationId, OperationError> {
        if self.shutdown.is_cancelled() {
            return Err(OperationError::Shutdown);
        }
        let operation = self
            .registry
            .create(definition, self.config.operation_timeout)
            .await?;

        info!(
            operation_id = %operation.id,
            kind = %operation.kind,
            name = %operation.name,
            "Operation created"
        );

        if self.config.eager_watch {
            if let Err(e) = self.ensure_watcher(&operation.id).await {
                // Shut down between the insert and the watcher start.
                self.registry.delete(&operation.id).await;
                return Err(e);
            }
        }
        Ok(operation.id)
    }

    /// Cached status of an operation. Never contacts the remote.
    pub async fn get_status(&self, id: &OperationId) -> Result<OperationStatus, OperationError> {
        self.registry.get(id).await.map(|op| op.status)
    }

    /// Full snapshot of an operation.
    pub async fn get(&self, id: &OperationId) -> Result<Operation, OperationError> {
        self.registry.get(id).await
    }

    /// Wait until the operation is terminal, or until `timeout` elapses.
    ///
    /// Resolves with the result of a completed operation and rejects with the
    /// matching error for `Failed`, `Cancelled` and `TimedOut`. If the
    /// caller's `timeout` runs out first the error is
    /// [`OperationError::WaitTimeout`] and the operation keeps running.
    pub async fn wait_for_completion(
        &self,
        id: &OperationId,
        timeout: Option<Duration>,
    ) -> Result<Value, OperationError> {
        self.await_outcome(id, timeout).await
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion), calling
    /// `on_progress` with a fresh snapshot on every poll tick.
    ///
    /// Ticks are buffered per operation (`tick_capacity`), so a slow callback
    /// still sees each one. A monitor further behind than that skips the
    /// oldest ticks, but always gets the terminal snapshot.
    pub async fn monitor<F>(
        &self,
        id: &OperationId,
        mut on_progress: F,
    ) -> Result<Value, OperationError>
    where
        F: FnMut(&Operation),
    {
        let (mut ticks, current) = self.registry.subscribe_ticks(id).await?;
        if let Some(outcome) = current.outcome() {
            return outcome;
        }
        self.ensure_watcher(id).await?;

        loop {
            let received = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(OperationError::Shutdown),
                received = ticks.recv() => received,
            };

            match received {
                Ok(snapshot) => {
                    on_progress(&snapshot);
                    if let Some(outcome) = snapshot.outcome() {
                        return outcome;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(operation_id = %id, skipped = n, "Monitor lagged, progress ticks dropped");
                }
                // Entry removed before reaching a terminal status.
                Err(RecvError::Closed) => return Err(OperationError::NotFound(id.clone())),
            }
        }
    }

    /// Cancel an active operation.
    pub async fn cancel(&self, id: &OperationId) -> Result<(), OperationError> {
        self.canceller.cancel(id).await.map(|_| ())
    }

    /// All operations that are not yet terminal.
    pub async fn list_active(&self) -> Vec<Operation> {
        self.registry.list_active().await
    }

    /// Evict terminal operations that ended more than `max_age` ago.
    ///
    /// Returns the number of evicted operations.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        self.sweeper.sweep(max_age).await.len()
    }

    /// Set an operation's status by hand.
    ///
    /// Follows the same rules as a poll: terminal statuses are final,
    /// `result` only goes with `Completed` and `error` only with `Failed`.
    pub async fn update_status(
        &self,
        id: &OperationId,
        status: OperationStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Operation, OperationError> {
        let operation = self
            .registry
            .mutate(id, |op| {
                if op.is_terminal() {
                    return Err(OperationError::InvalidState {
                        id: op.id.clone(),
                        status: op.status,
                        action: "update",
                    });
                }
                if status.is_terminal() {
                    op.finish(status, result, error)?;
                } else if result.is_some() || error.is_some() {
                    return Err(OperationError::Validation(
                        "result and error require a terminal status".to_string(),
                    ));
                } else {
                    op.advance(status, None)?;
                }
                Ok(op.clone())
            })
            .await?;

        info!(operation_id = %id, status = %operation.status, "Operation status set manually");
        Ok(operation)
    }

    /// Subscribe to lifecycle events of every operation.
    pub fn subscribe_events(&self) -> broadcast::Receiver<OperationEvent> {
        self.events.subscribe()
    }

    /// Stream of snapshots of one operation, one per poll tick.
    pub async fn updates(&self, id: &OperationId) -> Result<WatchStream<Operation>, OperationError> {
        Ok(WatchStream::new(self.registry.subscribe(id).await?))
    }

    /// Run [`cleanup`](Self::cleanup) in the background with the configured
    /// retention and interval until [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.sweeper.clone().spawn(
            self.config.sweep_interval,
            self.config.retention,
            self.shutdown.child_token(),
        )
    }

    /// Stop all watchers and the background sweeper.
    ///
    /// Operation statuses are left as they are; pending waits are rejected
    /// with [`OperationError::Shutdown`].
    pub fn shutdown(&self) {
        info!("Shutting down operation tracker");
        self.shutdown.cancel();
    }

    /// Start a watcher for `id` unless one is already running.
    async fn ensure_watcher(&self, id: &OperationId) -> Result<(), OperationError> {
        if self.shutdown.is_cancelled() {
            return Err(OperationError::Shutdown);
        }
        let stop = self.shutdown.child_token();
        let Some(plan) = self.registry.attach_watcher(id, stop.clone()).await? else {
            return Ok(());
        };

        Watcher {
            id: id.clone(),
            registry: self.registry.clone(),
            resolver: self.resolver.clone(),
            poll_interval: self.config.poll_interval,
            plan,
            max_failures: self.config.max_consecutive_resolver_failures,
            stop,
        }
        .spawn();
        Ok(())
    }

    async fn await_outcome(
        &self,
        id: &OperationId,
        timeout: Option<Duration>,
    ) -> Result<Value, OperationError> {
        let mut updates = self.registry.subscribe(id).await?;
        if let Some(outcome) = updates.borrow_and_update().outcome() {
            return outcome;
        }
        self.ensure_watcher(id).await?;

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let changed = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(OperationError::Shutdown),
                changed = next_change(&mut updates, deadline) => changed,
            };

            match changed {
                Some(Ok(())) => {
                    if let Some(outcome) = updates.borrow_and_update().outcome() {
                        return outcome;
                    }
                }
                // Sender gone: the entry was removed while we waited.
                Some(Err(_)) => {
                    return updates
                        .borrow()
                        .outcome()
                        .unwrap_or_else(|| Err(OperationError::NotFound(id.clone())));
                }
                None => {
                    let waited = timeout.unwrap_or_default();
                    debug!(operation_id = %id, waited_ms = waited.as_millis() as u64, "Wait timed out");
                    return Err(OperationError::WaitTimeout {
                        id: id.clone(),
                        waited,
                    });
                }
            }
        }
    }
}

/// Wait for the next snapshot, or `None` once `deadline` has passed.
async fn next_change(
    updates: &mut watch::Receiver<Operation>,
    deadline: Option<Instant>,
) -> Option<Result<(), watch::error::RecvError>> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, updates.changed())
            .await
            .ok(),
        None => Some(updates.changed().await),
    }
}
