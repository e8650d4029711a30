//! optrack Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Async runtime specifics
//!
//! All types here describe a remote long-running operation as seen by the
//! local tracker.

pub mod error;
pub mod event;
pub mod ids;
pub mod operation;
pub mod status;
pub mod translate;

// Re-export commonly used types
pub use error::OperationError;
pub use event::OperationEvent;
pub use ids::OperationId;
pub use operation::{Operation, OperationDefinition};
pub use status::OperationStatus;
pub use translate::{translate, translate_or, RawStatus};
