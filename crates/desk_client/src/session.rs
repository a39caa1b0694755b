//! Session state - everything one submission mutates.

use desk_core::{ChatMessage, ExecutionNodeEntry, TelemetryKind, TelemetryLogEntry};
use uuid::Uuid;

use crate::graph::ExecutionGraph;

/// Mutable state for one in-flight request.
///
/// Only the dispatcher and the driver in this crate write to it; callers get
/// read access. The message log outlives a single submission and is handed to
/// the next session through [`SessionState::successor`].
#[derive(Debug, Clone)]
pub struct SessionState {
    thread_id: Option<String>,
    pending_assistant_message_id: String,
    messages: Vec<ChatMessage>,
    execution: ExecutionGraph,
    telemetry: Vec<TelemetryLogEntry>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl SessionState {
    pub fn new(messages: Vec<ChatMessage>, thread_id: Option<String>) -> Self {
        Self {
            thread_id,
            pending_assistant_message_id: format!("{}-ai", Uuid::new_v4()),
            messages,
            execution: ExecutionGraph::new(),
            telemetry: Vec::new(),
        }
    }

    /// Start the next submission: the message log and thread identity move
    /// over, the execution and telemetry logs start empty.
    pub fn successor(&mut self) -> Self {
        Self::new(std::mem::take(&mut self.messages), self.thread_id.clone())
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn pending_assistant_message_id(&self) -> &str {
        &self.pending_assistant_message_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn pending_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .find(|message| message.id() == self.pending_assistant_message_id)
    }

    pub fn execution(&self) -> &ExecutionGraph {
        &self.execution
    }

    pub fn execution_log(&self) -> &[ExecutionNodeEntry] {
        self.execution.entries()
    }

    pub fn telemetry_log(&self) -> &[TelemetryLogEntry] {
        &self.telemetry
    }

    /// First write wins; returns whether the identifier was taken.
    pub(crate) fn assign_thread_id(&mut self, thread_id: &str) -> bool {
        match &self.thread_id {
            Some(existing) => {
                if existing != thread_id {
                    log::debug!(
                        "Ignoring thread id {} (session already bound to {})",
                        thread_id,
                        existing
                    );
                }
                false
            }
            None => {
                self.thread_id = Some(thread_id.to_string());
                true
            }
        }
    }

    pub(crate) fn pending_message_mut(&mut self) -> Option<&mut ChatMessage> {
        let id = &self.pending_assistant_message_id;
        self.messages.iter_mut().find(|message| message.id() == id)
    }

    pub(crate) fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub(crate) fn execution_mut(&mut self) -> &mut ExecutionGraph {
        &mut self.execution
    }

    pub(crate) fn log(&mut self, kind: TelemetryKind, msg: impl Into<String>) {
        self.telemetry.push(TelemetryLogEntry::now(kind, msg));
    }

    pub(crate) fn clear_telemetry(&mut self) {
        self.telemetry.clear();
    }
}
