//! Eviction of finished operations.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use optrack_core::OperationId;

use crate::registry::OperationRegistry;

/// Removes terminal operations once they are older than a retention window.
///
/// Only terminal entries are ever touched, so sweeping never races with a
/// watcher still driving an operation.
#[derive(Clone)]
pub struct CleanupSweeper {
    registry: Arc<OperationRegistry>,
}

impl CleanupSweeper {
    /// Create a new CleanupSweeper.
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    /// Evict terminal operations whose end time is more than `max_age` ago.
    pub async fn sweep(&self, max_age: Duration) -> Vec<OperationId> {
        let now = Instant::now();
        let evicted: Vec<OperationId> = self
            .registry
            .remove_if(|op, ended| {
                op.is_terminal()
                    && ended.is_some_and(|ended| now.saturating_duration_since(ended) > max_age)
            })
            .await
            .into_iter()
            .map(|op| op.id)
            .collect();

        if !evicted.is_empty() {
            info!(
                count = evicted.len(),
                max_age_ms = max_age.as_millis() as u64,
                "Evicted finished operations"
            );
        }
        evicted
    }

    /// Sweep every `interval` until `stop` fires.
    pub fn spawn(self, interval: Duration, max_age: Duration, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep(max_age).await;
                    }
                }
            }
            debug!("Cleanup sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrack_core::OperationDefinition;
    use serde_json::json;
    use tokio::sync::broadcast;

    async fn registry_with(
        names: &[&str],
    ) -> (Arc<OperationRegistry>, Vec<OperationId>) {
        let (tx, _) = broadcast::channel(16);
        let registry = Arc::new(OperationRegistry::new(tx));
        let mut ids = Vec::new();
        for name in names {
            let op = registry
                .create(
                    OperationDefinition::new("process", *name),
                    Duration::from_secs(3600),
                )
                .await
                .unwrap();
            ids.push(op.id);
        }
        (registry, ids)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_max_age() {
        let (registry, ids) = registry_with(&["a", "b"]).await;
        registry
            .mutate(&ids[0], |op| op.complete(json!(1)))
            .await
            .unwrap();
        let sweeper = CleanupSweeper::new(registry.clone());

        assert!(sweeper.sweep(Duration::from_secs(10)).await.is_empty());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sweeper.sweep(Duration::from_secs(10)).await, vec![ids[0].clone()]);
        assert!(registry.get(&ids[0]).await.is_err());
        assert!(registry.get(&ids[1]).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_operations_survive_any_age() {
        let (registry, ids) = registry_with(&["slow"]).await;
        tokio::time::sleep(Duration::from_secs(86_400)).await;

        let sweeper = CleanupSweeper::new(registry.clone());
        assert!(sweeper.sweep(Duration::ZERO).await.is_empty());
        assert!(registry.get(&ids[0]).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let (registry, ids) = registry_with(&["a"]).await;
        registry.mutate(&ids[0], |op| op.cancel()).await.unwrap();

        let stop = CancellationToken::new();
        let handle = CleanupSweeper::new(registry.clone()).spawn(
            Duration::from_secs(1),
            Duration::from_secs(2),
            stop.clone(),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(registry.is_empty().await);

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_aged_exactly_max_age_survives() {
        let (registry, ids) = registry_with(&["a"]).await;
        registry.mutate(&ids[0], |op| op.cancel()).await.unwrap();
        let sweeper = CleanupSweeper::new(registry.clone());

        assert!(sweeper.sweep(Duration::ZERO).await.is_empty());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(sweeper.sweep(Duration::from_secs(10)).await.is_empty());
        assert!(registry.get(&ids[0]).await.is_ok());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(sweeper.sweep(Duration::from_secs(10)).await, vec![ids[0].clone()]);
    }
}
