//! desk_client - Streaming client for the service desk orchestration backend
//!
//! Reads the backend's `event:`/`data:` response body chunk by chunk, parses it
//! into records and reconciles them into a [`SessionState`]: the growing
//! assistant reply, the stage timeline and the telemetry log.

pub mod approval;
pub mod backend;
pub mod conversation;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod graph;
pub mod reader;
pub mod record;
pub mod session;
pub mod update;

pub use approval::{ApprovalController, ApprovalOutcome};
pub use backend::{ByteStream, ChatRequest, DeskBackend, HttpBackend};
pub use conversation::{Conversation, SubmitOutcome};
pub use dispatcher::Dispatcher;
pub use driver::{StreamDriver, StreamOutcome};
pub use error::{DeskError, Result};
pub use graph::{ExecutionGraph, StageTransition};
pub use reader::{lines, LineBuffer, MAX_LINE_LENGTH};
pub use record::{records, EventKind, RecordParser, StreamRecord};
pub use session::SessionState;
pub use update::SessionUpdate;
