//! Per-operation polling task.
//!
//! A watcher polls the [`StatusResolver`] on a fixed interval and folds each
//! answer into the registry until the operation is terminal, its deadline
//! passes, or it is told to stop. The deadline and the stop signal are raced
//! against every in-flight fetch, so a hanging resolver cannot delay either.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use optrack_core::{OperationError, OperationId, RawStatus};

use crate::registry::{OperationRegistry, WatchPlan};
use crate::resolver::{ResolverError, StatusResolver};

/// Why a watcher loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Operation reached a terminal status on a poll.
    Finished,
    /// Deadline passed while the operation was still active.
    Deadline,
    /// Stop signal: cancellation, manual commit, eviction or shutdown.
    Stopped,
}

/// Polls one operation until it is done.
pub(crate) struct Watcher {
    pub id: OperationId,
    pub registry: Arc<OperationRegistry>,
    pub resolver: Arc<dyn StatusResolver>,
    pub poll_interval: Duration,
    pub plan: WatchPlan,
    pub max_failures: Option<u32>,
    pub stop: CancellationToken,
}

impl Watcher {
    /// Run the watcher on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(
            operation_id = %self.id,
            interval_ms = self.poll_interval.as_millis() as u64,
            timeout_ms = self.plan.timeout.as_millis() as u64,
            "Watching operation"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break Exit::Stopped,
                _ = sleep_until(self.plan.deadline) => break Exit::Deadline,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break Exit::Stopped,
                _ = sleep_until(self.plan.deadline) => break Exit::Deadline,
                fetched = self.resolver.fetch_status(&self.id) => fetched,
            };

            let finished = match fetched {
                Ok(raw) => {
                    failures = 0;
                    self.apply(raw).await
                }
                Err(e) => {
                    failures += 1;
                    self.record_failure(e, failures).await
                }
            };
            if finished {
                break Exit::Finished;
            }
        };

        if exit == Exit::Deadline {
            self.time_out().await;
        }
        self.registry.detach_watcher(&self.id).await;
        debug!(operation_id = %self.id, exit = ?exit, "Watcher exited");
    }

    /// Fold a successful poll into the registry. Returns true when done.
    async fn apply(&self, raw: RawStatus) -> bool {
        let applied = self
            .registry
            .mutate(&self.id, |op| Ok((op.apply_raw(&raw), op.is_terminal())))
            .await;

        match applied {
            Ok((Some(status), terminal)) => {
                if terminal {
                    info!(operation_id = %self.id, status = %status, "Operation finished");
                } else {
                    debug!(operation_id = %self.id, status = %status, "Operation status changed");
                }
                terminal
            }
            Ok((None, terminal)) => {
                trace!(
                    operation_id = %self.id,
                    raw_status = %raw.text,
                    progress = ?raw.progress,
                    "Poll tick"
                );
                terminal
            }
            // Evicted or deleted underneath us.
            Err(_) => true,
        }
    }

    /// Handle a failed fetch. Returns true when done.
    async fn record_failure(&self, error: ResolverError, failures: u32) -> bool {
        warn!(
            operation_id = %self.id,
            error = %error,
            consecutive_failures = failures,
            "Status fetch failed, keeping cached status"
        );

        let exhausted = self.max_failures.is_some_and(|max| failures >= max);
        let outcome = if exhausted {
            let message = format!(
                "status resolver failed {} consecutive times: {}",
                failures, error
            );
            self.registry
                .mutate(&self.id, |op| op.fail(message).map(|_| true))
                .await
        } else {
            // Republish the cached snapshot so monitors still see the tick.
            self.registry
                .mutate(&self.id, |op| Ok(op.is_terminal()))
                .await
        };

        match outcome {
            Ok(done) => {
                if exhausted {
                    warn!(operation_id = %self.id, "Resolver failures exhausted, operation failed");
                }
                done
            }
            Err(OperationError::NotFound(_)) => true,
            Err(_) => false,
        }
    }

    async fn time_out(&self) {
        match self.registry.mutate(&self.id, |op| op.time_out()).await {
            Ok(()) => info!(
                operation_id = %self.id,
                timeout_ms = self.plan.timeout.as_millis() as u64,
                "Operation timed out"
            ),
            Err(e) => debug!(operation_id = %self.id, error = %e, "Timeout not applied"),
        }
    }
}
