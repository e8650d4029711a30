//! Operation and OperationDefinition types.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OperationError, OperationId, OperationStatus, RawStatus};

/// What a caller supplies to start tracking an operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationDefinition {
    /// Opaque classification, e.g. `process_execution`.
    pub kind: String,

    /// Human-readable label.
    pub name: String,

    /// Parameters the operation was submitted with.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,

    /// Free-form caller metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Overrides the engine-wide operation timeout.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl OperationDefinition {
    /// Create a new definition with the required fields.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder method to add a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Builder method to add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builder method to set a per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate(&self) -> Result<(), OperationError> {
        if self.kind.trim().is_empty() {
            return Err(OperationError::Validation(
                "operation type is required".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(OperationError::Validation(
                "operation name is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A locally tracked long-running remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation identifier.
    pub id: OperationId,

    /// Opaque classification.
    pub kind: String,

    /// Human-readable label.
    pub name: String,

    /// Current status.
    pub status: OperationStatus,

    /// Advisory progress, 0-100.
    pub progress: Option<f64>,

    /// When tracking started.
    pub started_at: DateTime<Utc>,

    /// When the operation reached a terminal status.
    pub ended_at: Option<DateTime<Utc>>,

    /// Result payload; present iff `Completed`.
    pub result: Option<Value>,

    /// Error message; present iff `Failed`.
    pub error: Option<String>,

    pub parameters: HashMap<String, Value>,

    pub metadata: HashMap<String, Value>,
}

impl Operation {
    /// Create a pending Operation from a definition.
    pub fn from_definition(definition: OperationDefinition) -> Result<Self, OperationError> {
        definition.validate()?;
        Ok(Self {
            id: OperationId::generate(),
            kind: definition.kind,
            name: definition.name,
            status: OperationStatus::Pending,
            progress: None,
            started_at: Utc::now(),
            ended_at: None,
            result: None,
            error: None,
            parameters: definition.parameters,
            metadata: definition.metadata,
        })
    }

    /// Check if the operation is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a non-terminal status and optional progress.
    ///
    /// Returns true if the status changed.
    pub fn advance(
        &mut self,
        status: OperationStatus,
        progress: Option<f64>,
    ) -> Result<bool, OperationError> {
        if status.is_terminal() || !self.status.can_transition_to(status) {
            return Err(self.invalid_state("move to a non-terminal status"));
        }
        self.set_progress(progress);
        let changed = self.status != status;
        self.status = status;
        Ok(changed)
    }

    /// Commit a terminal status.
    ///
    /// `result` is only accepted with `Completed` and `error` only with
    /// `Failed`. A completion without payload stores `null`, and a failure
    /// without a message stores a generic one, so the pairing invariants hold.
    pub fn finish(
        &mut self,
        status: OperationStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), OperationError> {
        if !status.is_terminal() {
            return Err(OperationError::Validation(format!(
                "{status} is not a terminal status"
            )));
        }
        if self.is_terminal() {
            return Err(self.invalid_state("finish"));
        }
        if result.is_some() && status != OperationStatus::Completed {
            return Err(OperationError::Validation(format!(
                "result given for {status} operation"
            )));
        }
        if error.is_some() && status != OperationStatus::Failed {
            return Err(OperationError::Validation(format!(
                "error given for {status} operation"
            )));
        }

        self.status = status;
        self.ended_at = Some(Utc::now());
        match status {
            OperationStatus::Completed => {
                self.result = Some(result.unwrap_or(Value::Null));
                self.progress = Some(100.0);
            }
            OperationStatus::Failed => {
                self.error = Some(error.unwrap_or_else(|| "operation failed".to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    /// Mark the operation as completed.
    pub fn complete(&mut self, result: Value) -> Result<(), OperationError> {
        self.finish(OperationStatus::Completed, Some(result), None)
    }

    /// Mark the operation as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), OperationError> {
        self.finish(OperationStatus::Failed, None, Some(error.into()))
    }

    /// Mark the operation as cancelled.
    pub fn cancel(&mut self) -> Result<(), OperationError> {
        self.finish(OperationStatus::Cancelled, None, None)
    }

    /// Mark the operation as timed out.
    pub fn time_out(&mut self) -> Result<(), OperationError> {
        self.finish(OperationStatus::TimedOut, None, None)
    }

    /// Fold one status read from the remote into this operation.
    ///
    /// Unrecognized status text keeps the current status; progress is still
    /// recorded. Returns the new status when it changed.
    pub fn apply_raw(&mut self, raw: &RawStatus) -> Option<OperationStatus> {
        if self.is_terminal() {
            return None;
        }
        let before = self.status;
        let next = raw.status_or(before);
        let applied = match next {
            OperationStatus::Completed => self.finish(
                next,
                Some(raw.result.clone().unwrap_or(Value::Null)),
                None,
            ),
            OperationStatus::Failed => self.finish(
                next,
                None,
                Some(
                    raw.error
                        .clone()
                        .unwrap_or_else(|| "remote operation completed with errors".to_string()),
                ),
            ),
            OperationStatus::Cancelled | OperationStatus::TimedOut => {
                self.finish(next, None, None)
            }
            _ if before.can_transition_to(next) => self.advance(next, raw.progress).map(|_| ()),
            _ => {
                self.set_progress(raw.progress);
                Ok(())
            }
        };
        match applied {
            Ok(()) if self.status != before => Some(self.status),
            _ => None,
        }
    }

    /// The terminal outcome, or `None` while the operation is active.
    pub fn outcome(&self) -> Option<Result<Value, OperationError>> {
        let outcome = match self.status {
            OperationStatus::Pending | OperationStatus::Running => return None,
            OperationStatus::Completed => Ok(self.result.clone().unwrap_or(Value::Null)),
            OperationStatus::Failed => Err(OperationError::Failed {
                id: self.id.clone(),
                message: self.error.clone().unwrap_or_default(),
            }),
            OperationStatus::Cancelled => Err(OperationError::Cancelled(self.id.clone())),
            OperationStatus::TimedOut => Err(OperationError::TimedOut {
                id: self.id.clone(),
            }),
        };
        Some(outcome)
    }

    fn set_progress(&mut self, progress: Option<f64>) {
        if let Some(p) = progress.filter(|p| p.is_finite()) {
            self.progress = Some(p.clamp(0.0, 100.0));
        }
    }

    fn invalid_state(&self, action: &'static str) -> OperationError {
        OperationError::InvalidState {
            id: self.id.clone(),
            status: self.status,
            action,
        }
    }
}
