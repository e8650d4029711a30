//! JSON output for streaming tracker events to stdout.

use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use optrack_core::{Operation, OperationEvent};

/// Global flag to enable JSON output mode.
static JSON_MODE_ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable JSON output mode.
pub fn enable_json_mode() {
    JSON_MODE_ENABLED.store(true, Ordering::SeqCst);
}

/// Check if JSON mode is enabled.
pub fn is_json_mode() -> bool {
    JSON_MODE_ENABLED.load(Ordering::SeqCst)
}

/// JSON line types that can be emitted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonEventType {
    Lifecycle,
    Progress,
    Summary,
}

/// A JSON line to be written to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEvent {
    pub event: JsonEventType,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl JsonEvent {
    /// Create a new JSON event with the current timestamp.
    pub fn new(event: JsonEventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    /// Output this event as a JSON line to stdout.
    pub fn emit(&self) {
        if !is_json_mode() {
            return;
        }
        if let Ok(json) = serde_json::to_string(self) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", json);
            let _ = stdout.flush();
        }
    }
}

/// Emit a lifecycle event.
pub fn emit_lifecycle(event: &OperationEvent) {
    JsonEvent::new(
        JsonEventType::Lifecycle,
        serde_json::to_value(event).unwrap_or_default(),
    )
    .emit();
}

/// Emit a progress tick.
pub fn emit_progress(op: &Operation) {
    JsonEvent::new(
        JsonEventType::Progress,
        serde_json::json!({
            "id": op.id,
            "status": op.status,
            "progress": op.progress,
        }),
    )
    .emit();
}

/// Emit the final state of an operation.
pub fn emit_summary(op: &Operation) {
    JsonEvent::new(
        JsonEventType::Summary,
        serde_json::to_value(op).unwrap_or_default(),
    )
    .emit();
}
