//! Shared operation registry.
//!
//! The registry is the single source of truth for operation state. Every
//! mutation goes through [`OperationRegistry::mutate`], which runs under the
//! write lock, publishes the new snapshot to the operation's subscribers and
//! emits lifecycle events. The lock is never held across a resolver call.
//!
//! Each entry fans out twice: a `watch` channel holding the latest snapshot
//! for waiters, and a bounded `broadcast` channel carrying every tick for
//! monitors.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use optrack_core::{Operation, OperationDefinition, OperationError, OperationEvent, OperationId};

/// Registry-side state of one tracked operation.
struct Entry {
    operation: Operation,

    /// Monotonic creation time; the operation timeout counts from here.
    started: Instant,

    /// Monotonic time the operation became terminal.
    ended: Option<Instant>,

    timeout: Duration,

    /// Latest snapshot, fanned out to every waiter.
    updates: watch::Sender<Operation>,

    /// Every committed snapshot, in order.
    ticks: broadcast::Sender<Operation>,

    /// Stop signal of the watcher currently polling this operation.
    watcher: Option<CancellationToken>,
}

/// What a watcher needs to know when it takes over an operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WatchPlan {
    pub deadline: Instant,
    pub timeout: Duration,
}

/// Default number of ticks a monitor may fall behind before it lags.
pub const DEFAULT_TICK_CAPACITY: usize = 64;

/// Concurrency-safe map of operation id to operation state.
pub struct OperationRegistry {
    entries: RwLock<HashMap<OperationId, Entry>>,
    events: broadcast::Sender<OperationEvent>,
    tick_capacity: usize,
}

impl OperationRegistry {
    /// Create an empty registry publishing lifecycle events on `events`.
    pub fn new(events: broadcast::Sender<OperationEvent>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
            tick_capacity: DEFAULT_TICK_CAPACITY,
        }
    }

    /// Builder method to set the per-operation tick buffer.
    pub fn with_tick_capacity(mut self, capacity: usize) -> Self {
        self.tick_capacity = capacity.max(1);
        self
    }

    /// Register a new pending operation.
    pub async fn create(
        &self,
        definition: OperationDefinition,
        default_timeout: Duration,
    ) -> Result<Operation, OperationError> {
        let timeout = definition.timeout.unwrap_or(default_timeout);
        let operation = Operation::from_definition(definition)?;
        let (updates, _) = watch::channel(operation.clone());
        let (ticks, _) = broadcast::channel(self.tick_capacity);

        let entry = Entry {
            operation: operation.clone(),
            started: Instant::now(),
            ended: None,
            timeout,
            updates,
            ticks,
            watcher: None,
        };
        self.entries
            .write()
            .await
            .insert(operation.id.clone(), entry);

        self.notify(OperationEvent::Created {
            id: operation.id.clone(),
            kind: operation.kind.clone(),
            name: operation.name.clone(),
        });
        Ok(operation)
    }

    /// Snapshot of one operation.
    pub async fn get(&self, id: &OperationId) -> Result<Operation, OperationError> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.operation.clone())
            .ok_or_else(|| OperationError::NotFound(id.clone()))
    }

    /// Apply `f` to an operation atomically.
    ///
    /// If the status changes, a `StatusChanged` event is emitted; if it
    /// becomes terminal, the end time is stamped and the watcher is told to
    /// stop. The resulting snapshot is always republished, so monitors see
    /// every tick.
    pub async fn mutate<R>(
        &self,
        id: &OperationId,
        f: impl FnOnce(&mut Operation) -> Result<R, OperationError>,
    ) -> Result<R, OperationError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| OperationError::NotFound(id.clone()))?;

        let before = entry.operation.status;
        let out = f(&mut entry.operation)?;
        let after = entry.operation.status;

        if after != before {
            if after.is_terminal() {
                entry.ended = Some(Instant::now());
                if let Some(stop) = entry.watcher.take() {
                    stop.cancel();
                }
            }
            self.notify(OperationEvent::StatusChanged {
                id: id.clone(),
                from: before,
                to: after,
            });
        }
        // No monitor is fine.
        let _ = entry.ticks.send(entry.operation.clone());
        entry.updates.send_replace(entry.operation.clone());
        Ok(out)
    }

    /// Remove an operation regardless of its status.
    pub async fn delete(&self, id: &OperationId) -> Option<Operation> {
        let entry = self.entries.write().await.remove(id)?;
        Some(self.release(entry))
    }

    /// Remove every operation matching `pred`, given the snapshot and the
    /// monotonic end time.
    pub async fn remove_if(
        &self,
        mut pred: impl FnMut(&Operation, Option<Instant>) -> bool,
    ) -> Vec<Operation> {
        let mut entries = self.entries.write().await;
        let doomed: Vec<OperationId> = entries
            .iter()
            .filter(|(_, entry)| pred(&entry.operation, entry.ended))
            .map(|(id, _)| id.clone())
            .collect();

        doomed
            .iter()
            .filter_map(|id| entries.remove(id))
            .map(|entry| self.release(entry))
            .collect()
    }

    /// Subscribe to snapshots of one operation.
    ///
    /// The receiver starts at the latest committed snapshot, so a subscriber
    /// arriving after termination sees the final outcome immediately.
    pub async fn subscribe(
        &self,
        id: &OperationId,
    ) -> Result<watch::Receiver<Operation>, OperationError> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.updates.subscribe())
            .ok_or_else(|| OperationError::NotFound(id.clone()))
    }

    /// Subscribe to every future snapshot of one operation.
    ///
    /// Returns the receiver together with the current snapshot, taken under
    /// the same lock, so no tick falls between the two.
    pub async fn subscribe_ticks(
        &self,
        id: &OperationId,
    ) -> Result<(broadcast::Receiver<Operation>, Operation), OperationError> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| (entry.ticks.subscribe(), entry.operation.clone()))
            .ok_or_else(|| OperationError::NotFound(id.clone()))
    }

    /// Non-terminal operations, oldest first.
    pub async fn list_active(&self) -> Vec<Operation> {
        let mut active: Vec<Operation> = self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.operation.status.is_active())
            .map(|entry| entry.operation.clone())
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    /// Snapshots of every tracked operation.
    pub async fn snapshot(&self) -> Vec<Operation> {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.operation.clone())
            .collect()
    }

    /// Get the number of tracked operations.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get the number of operations with a live watcher.
    pub async fn watcher_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.watcher.is_some())
            .count()
    }

    /// Claim an operation for a watcher.
    ///
    /// Returns `None` when the operation is already terminal or already
    /// watched, so there is at most one poller per operation.
    pub(crate) async fn attach_watcher(
        &self,
        id: &OperationId,
        stop: CancellationToken,
    ) -> Result<Option<WatchPlan>, OperationError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| OperationError::NotFound(id.clone()))?;

        if entry.operation.is_terminal() || entry.watcher.is_some() {
            return Ok(None);
        }
        entry.watcher = Some(stop);
        Ok(Some(WatchPlan {
            deadline: entry.started + entry.timeout,
            timeout: entry.timeout,
        }))
    }

    /// Forget the watcher of an operation once it has exited.
    pub(crate) async fn detach_watcher(&self, id: &OperationId) {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.watcher = None;
        }
    }

    fn release(&self, entry: Entry) -> Operation {
        if let Some(stop) = entry.watcher {
            stop.cancel();
        }
        self.notify(OperationEvent::Evicted {
            id: entry.operation.id.clone(),
        });
        entry.operation
    }

    fn notify(&self, event: OperationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
