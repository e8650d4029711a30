//! Lifecycle events published as operations move through their states.

use serde::{Deserialize, Serialize};

use crate::ids::OperationId;
use crate::OperationStatus;

/// A lifecycle event for a tracked operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OperationEvent {
    /// Operation registered for tracking.
    Created {
        id: OperationId,
        kind: String,
        name: String,
    },
    /// Operation status changed.
    StatusChanged {
        id: OperationId,
        from: OperationStatus,
        to: OperationStatus,
    },
    /// Terminal operation removed by cleanup.
    Evicted { id: OperationId },
}

impl OperationEvent {
    /// The operation this event is about.
    pub fn operation_id(&self) -> &OperationId {
        match self {
            Self::Created { id, .. } | Self::StatusChanged { id, .. } | Self::Evicted { id } => id,
        }
    }

    /// Returns true if this event marks the end of an operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StatusChanged { to, .. } if to.is_terminal())
    }
}
