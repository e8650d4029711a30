//! Simulation configuration.

use std::time::Duration;

use optrack_engine::EngineConfig;

/// Settings for one simulated batch of operations.
pub struct Config {
    /// Number of operations to submit.
    pub operations: usize,

    /// Polls a healthy operation needs before it completes.
    pub steps: u32,

    /// Indices of operations that finish with errors.
    pub fail: Vec<usize>,

    /// Indices of operations that never finish.
    pub hang: Vec<usize>,

    /// Indices of operations whose status reads fail every other poll.
    pub flaky: Vec<usize>,

    /// Index of an operation to cancel, and when.
    pub cancel: Option<(usize, Duration)>,

    /// Engine settings.
    pub engine: EngineConfig,
}
