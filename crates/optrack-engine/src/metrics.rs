//! Prometheus metrics collection and formatting.
//!
//! This module renders tracker state in Prometheus text exposition format.

use std::collections::HashMap;
use std::fmt::Write;

use optrack_core::OperationStatus;

use crate::registry::OperationRegistry;
use crate::tracker::OperationTracker;

/// Collect all metrics from a tracker and format as Prometheus text.
pub async fn collect_metrics(tracker: &OperationTracker) -> String {
    let mut output = String::new();

    collect_operation_metrics(tracker.registry(), &mut output).await;
    collect_watcher_metrics(tracker.registry(), &mut output).await;

    output
}

/// Collect operation counts by status.
async fn collect_operation_metrics(registry: &OperationRegistry, output: &mut String) {
    let mut counts: HashMap<OperationStatus, u64> = HashMap::new();
    for op in registry.snapshot().await {
        *counts.entry(op.status).or_default() += 1;
    }

    writeln!(
        output,
        "# HELP optrack_operations Number of tracked operations by status"
    )
    .ok();
    writeln!(output, "# TYPE optrack_operations gauge").ok();
    for status in OperationStatus::ALL {
        let count = counts.get(&status).copied().unwrap_or(0);
        writeln!(
            output,
            "optrack_operations{{status=\"{}\"}} {count}",
            status.as_str()
        )
        .ok();
    }
}

/// Collect the number of live watchers.
async fn collect_watcher_metrics(registry: &OperationRegistry, output: &mut String) {
    let watchers = registry.watcher_count().await;

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP optrack_watchers_active Number of operations currently being polled"
    )
    .ok();
    writeln!(output, "# TYPE optrack_watchers_active gauge").ok();
    writeln!(output, "optrack_watchers_active {watchers}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::testing::ScriptedResolver;
    use optrack_core::{OperationDefinition, RawStatus};
    use serde_json::json;

    #[tokio::test]
    async fn test_collect_metrics_empty_tracker() {
        let tracker = OperationTracker::new(
            ScriptedResolver::always(RawStatus::new("Running")),
            EngineConfig::default(),
        );
        let output = collect_metrics(&tracker).await;

        assert!(output.contains("# TYPE optrack_operations gauge"));
        assert!(output.contains("optrack_operations{status=\"pending\"} 0"));
        assert!(output.contains("optrack_operations{status=\"timed_out\"} 0"));
        assert!(output.contains("optrack_watchers_active 0"));
    }

    #[tokio::test]
    async fn test_collect_metrics_counts_by_status() {
        let tracker = OperationTracker::new(
            ScriptedResolver::always(RawStatus::new("Running")),
            EngineConfig::default().with_eager_watch(false),
        );
        let done = tracker
            .create_operation(OperationDefinition::new("process", "a"))
            .await
            .unwrap();
        tracker
            .create_operation(OperationDefinition::new("process", "b"))
            .await
            .unwrap();
        tracker
            .update_status(&done, OperationStatus::Completed, Some(json!(1)), None)
            .await
            .unwrap();

        let output = collect_metrics(&tracker).await;
        assert!(output.contains("optrack_operations{status=\"pending\"} 1"));
        assert!(output.contains("optrack_operations{status=\"completed\"} 1"));
        assert!(output.contains("optrack_operations{status=\"running\"} 0"));
    }
}
