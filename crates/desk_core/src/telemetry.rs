//! Telemetry log - a human readable trace kept apart from the transcript.

use chrono::Local;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    Info,
    Success,
    Error,
    Node,
    Hitl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryLogEntry {
    pub time: String,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: TelemetryKind,
}

impl TelemetryLogEntry {
    /// Stamp a new entry with the local wall-clock time.
    pub fn now(kind: TelemetryKind, msg: impl Into<String>) -> Self {
        Self {
            time: Local::now().format("%H:%M:%S").to_string(),
            msg: msg.into(),
            kind,
        }
    }
}
