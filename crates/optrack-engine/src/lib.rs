//! optrack Engine
//!
//! Tracks long-running remote operations whose only visibility is a status
//! endpoint. Each active operation gets one polling task; callers wait on a
//! per-operation snapshot channel, so any number of waiters share one poller.

pub mod cancel;
pub mod config;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod sweeper;
pub mod tracker;
mod watcher;

#[cfg(test)]
mod testing;

pub use cancel::Canceller;
pub use config::EngineConfig;
pub use registry::OperationRegistry;
pub use resolver::{ResolverError, StatusResolver};
pub use sweeper::CleanupSweeper;
pub use tracker::OperationTracker;

pub use optrack_core::{
    Operation, OperationDefinition, OperationError, OperationEvent, OperationId, OperationStatus,
    RawStatus,
};
