//! Status enum for tracked Operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical status of a tracked Operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Operation submitted but not yet picked up by the server.
    #[default]
    Pending,
    /// Operation executing on the server.
    Running,
    /// Operation completed successfully.
    Completed,
    /// Operation finished with errors.
    Failed,
    /// Operation was cancelled.
    Cancelled,
    /// Operation exceeded its timeout without finishing.
    TimedOut,
}

impl OperationStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OperationStatus; 6] = [
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::TimedOut,
    ];

    /// Returns true if the operation is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }

    /// Returns true if the operation is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` is a legal edge.
    ///
    /// Nothing leaves a terminal state, and a running operation never goes
    /// back to pending. Staying in the same non-terminal state is allowed.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (Self::Running, Self::Pending) => false,
            _ => true,
        }
    }

    /// Lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = OperationStatus::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal.len(), 4);
        assert!(OperationStatus::Pending.is_active());
        assert!(OperationStatus::Running.is_active());
    }

    #[test]
    fn test_no_edges_leave_terminal() {
        for from in OperationStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in OperationStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_running_does_not_regress() {
        assert!(OperationStatus::Pending.can_transition_to(OperationStatus::Running));
        assert!(OperationStatus::Running.can_transition_to(OperationStatus::Running));
        assert!(!OperationStatus::Running.can_transition_to(OperationStatus::Pending));
        assert!(OperationStatus::Pending.can_transition_to(OperationStatus::TimedOut));
    }

    #[test]
    fn test_serde_representation() {
        let json = serde_json::to_string(&OperationStatus::TimedOut).unwrap();
        assert_eq!(json, "\"TIMED_OUT\"");
    }
}
