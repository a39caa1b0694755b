//! Stream dispatcher - applies records to session state.
//!
//! Each record is applied in arrival order and every rule leaves the session
//! in a complete, valid state, so a stream that stops between records needs
//! no rollback.

use desk_core::{stage_label, ChatMessage, TelemetryKind};
use log::{debug, warn};

use crate::record::{EventKind, StreamRecord};
use crate::session::SessionState;
use crate::update::SessionUpdate;

pub struct Dispatcher<'a> {
    session: &'a mut SessionState,
}

impl<'a> Dispatcher<'a> {
    pub fn new(session: &'a mut SessionState) -> Self {
        Self { session }
    }

    /// Apply one record and report what changed.
    pub fn apply(&mut self, record: &StreamRecord) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();

        if let Some(thread_id) = record.thread_id() {
            if self.session.assign_thread_id(thread_id) {
                updates.push(SessionUpdate::ThreadAssigned {
                    thread_id: thread_id.to_string(),
                });
            }
        }

        if record.kind == EventKind::Error {
            updates.push(self.apply_error(record));
            return updates;
        }

        if record.is_malformed() {
            debug!(
                "Skipping malformed {} payload: {}",
                record.declared_kind, record.raw_payload
            );
            return updates;
        }

        if record.kind == EventKind::Token {
            updates.extend(self.apply_token(record.token().unwrap_or_default()));
        }

        if let Some(node) = record.node() {
            updates.push(self.apply_node(node, record.intent()));
        }

        // Inference only ever produces `Token`, so this kind was declared.
        if record.kind == EventKind::FinalResponse {
            if let Some(response) = record.response() {
                updates.extend(self.apply_final(response, record));
            }
        }

        updates
    }

    fn apply_token(&mut self, token: &str) -> Option<SessionUpdate> {
        let message_id = self.session.pending_assistant_message_id().to_string();

        match self.session.pending_message_mut() {
            Some(message) => {
                if !message.append(token) {
                    warn!("Dropping token for finalized message {}", message_id);
                    return None;
                }
            }
            None => {
                self.session
                    .push_message(ChatMessage::streaming_assistant(&message_id, token));
            }
        }

        Some(SessionUpdate::TokenAppended {
            message_id,
            token: token.to_string(),
        })
    }

    fn apply_error(&mut self, record: &StreamRecord) -> SessionUpdate {
        let detail = record
            .detail()
            .unwrap_or(record.raw_payload.as_str())
            .to_string();
        warn!("Backend reported an error: {}", record.raw_payload);

        self.session.log(
            TelemetryKind::Error,
            format!("Cluster error: {}", record.raw_payload),
        );
        self.session
            .push_message(ChatMessage::assistant(format!("Backend error: {detail}")));

        SessionUpdate::ProtocolError { detail }
    }

    fn apply_node(&mut self, node: &str, intent: Option<&str>) -> SessionUpdate {
        self.session
            .log(TelemetryKind::Node, format!("Node active: {node}"));
        let transition = self.session.execution_mut().enter(node, intent);
        SessionUpdate::stage(node, stage_label(node), transition)
    }

    fn apply_final(&mut self, response: &str, record: &StreamRecord) -> Option<SessionUpdate> {
        let message_id = self.session.pending_assistant_message_id().to_string();
        let Some(message) = self.session.pending_message_mut() else {
            warn!(
                "Final response arrived without a pending message {}; ignoring",
                message_id
            );
            return None;
        };

        let finalized = match record.fields() {
            Some(fields) => message.finalize(response, fields),
            None => message.finalize(response, &Default::default()),
        };
        if !finalized {
            warn!("Ignoring repeated final response for message {}", message_id);
            return None;
        }
        self.session.log(TelemetryKind::Success, "Response finalized.");

        Some(SessionUpdate::Finalized {
            message_id,
            content: response.to_string(),
        })
    }
}
