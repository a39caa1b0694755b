//! desk_core - Core types for the service desk stream client
//!
//! Shared data model for the chat transcript, the execution timeline and the
//! telemetry log, plus the client configuration.

pub mod config;
pub mod execution;
pub mod message;
pub mod telemetry;

// Re-export commonly used types
pub use config::{DeskConfig, Provider};
pub use execution::{stage_label, ExecutionNodeEntry, NodeStatus};
pub use message::{ChatMessage, Role};
pub use telemetry::{TelemetryKind, TelemetryLogEntry};
