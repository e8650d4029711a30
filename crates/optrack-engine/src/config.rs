//! Engine configuration.

use std::time::Duration;

use crate::registry::DEFAULT_TICK_CAPACITY;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between two status polls of the same operation.
    pub poll_interval: Duration,

    /// How long an operation may stay active before it is forced to `TimedOut`.
    pub operation_timeout: Duration,

    /// Age past the end time after which the background sweeper evicts
    /// terminal operations.
    pub retention: Duration,

    /// How often the background sweeper runs.
    pub sweep_interval: Duration,

    /// Force `Failed` after this many consecutive status fetch errors.
    /// `None` keeps the cached status forever.
    pub max_consecutive_resolver_failures: Option<u32>,

    /// Start polling as soon as an operation is created. When false, polling
    /// starts on the first wait or monitor call.
    pub eager_watch: bool,

    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,

    /// Ticks buffered per operation for monitors that fall behind.
    pub tick_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            operation_timeout: Duration::from_millis(300_000),
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            max_consecutive_resolver_failures: None,
            eager_watch: true,
            event_capacity: 256,
            tick_capacity: DEFAULT_TICK_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Builder method to set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder method to set the default operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Builder method to set retention and sweep interval of the background sweeper.
    pub fn with_sweeper(mut self, retention: Duration, sweep_interval: Duration) -> Self {
        self.retention = retention;
        self.sweep_interval = sweep_interval;
        self
    }

    /// Builder method to cap consecutive resolver failures.
    pub fn with_max_resolver_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_resolver_failures = Some(failures);
        self
    }

    /// Builder method to toggle eager watching.
    pub fn with_eager_watch(mut self, eager: bool) -> Self {
        self.eager_watch = eager;
        self
    }
}
