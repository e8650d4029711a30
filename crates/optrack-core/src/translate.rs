//! Mapping from vendor status strings to [`OperationStatus`].
//!
//! The remote server reports status as free-form text. Only the strings below
//! are trusted; anything else leaves the cached status untouched, so a garbled
//! read is never taken as a final outcome. A failed status read never reaches
//! the translator and likewise keeps the cached status.

use serde::{Deserialize, Serialize};

use crate::OperationStatus;

/// Raw status as returned by the remote status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatus {
    /// Vendor-specific status text, e.g. `CompletedSuccessfully`.
    pub text: String,

    /// Optional progress hint (0-100).
    #[serde(default)]
    pub progress: Option<f64>,

    /// Result payload, meaningful only for successful completion.
    #[serde(default)]
    pub result: Option<serde_json::Value>,

    /// Error message, meaningful only for failed completion.
    #[serde(default)]
    pub error: Option<String>,
}

impl RawStatus {
    /// Create a raw status with just the status text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Builder method to set progress.
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Builder method to set the result payload.
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Builder method to set the error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Translate the status text, keeping `previous` when unrecognized.
    pub fn status_or(&self, previous: OperationStatus) -> OperationStatus {
        translate_or(&self.text, previous)
    }
}

/// Translate a raw status string, if it is one we recognize.
pub fn translate(raw: &str) -> Option<OperationStatus> {
    let status = match raw {
        "Pending" => OperationStatus::Pending,
        "Running" => OperationStatus::Running,
        "CompletedSuccessfully" => OperationStatus::Completed,
        "CompletedWithErrors" => OperationStatus::Failed,
        "Cancelled" => OperationStatus::Cancelled,
        "Timeout" => OperationStatus::TimedOut,
        _ => return None,
    };
    Some(status)
}

/// Translate a raw status string, falling back to the cached status.
pub fn translate_or(raw: &str, previous: OperationStatus) -> OperationStatus {
    translate(raw).unwrap_or(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_strings() {
        assert_eq!(translate("Pending"), Some(OperationStatus::Pending));
        assert_eq!(translate("Running"), Some(OperationStatus::Running));
        assert_eq!(
            translate("CompletedSuccessfully"),
            Some(OperationStatus::Completed)
        );
        assert_eq!(
            translate("CompletedWithErrors"),
            Some(OperationStatus::Failed)
        );
        assert_eq!(translate("Cancelled"), Some(OperationStatus::Cancelled));
        assert_eq!(translate("Timeout"), Some(OperationStatus::TimedOut));
    }

    #[test]
    fn test_unknown_keeps_previous() {
        assert_eq!(
            translate_or("Queued", OperationStatus::Running),
            OperationStatus::Running
        );
        assert_eq!(
            translate_or("completedsuccessfully", OperationStatus::Pending),
            OperationStatus::Pending
        );
        assert_eq!(translate_or("", OperationStatus::Pending), OperationStatus::Pending);
    }

    #[test]
    fn test_raw_status_deserializes_with_missing_fields() {
        let raw: RawStatus = serde_json::from_str(r#"{"text":"Running","progress":12.5}"#).unwrap();
        assert_eq!(raw.text, "Running");
        assert_eq!(raw.progress, Some(12.5));
        assert!(raw.result.is_none());
        assert!(raw.error.is_none());
    }
}
