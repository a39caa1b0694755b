//! Session updates - what a dispatched record changed.

use serde::Serialize;

use crate::graph::StageTransition;

/// One applied mutation, published to renderers while the stream is running.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// The session was bound to a backend thread.
    ThreadAssigned { thread_id: String },

    /// Text was appended to the pending assistant message.
    TokenAppended { message_id: String, token: String },

    /// A processing stage became the active one.
    StageEntered {
        node: String,
        label: String,
        reentered: bool,
    },

    /// The pending assistant message received its authoritative content.
    Finalized { message_id: String, content: String },

    /// The backend reported an error inside the stream.
    ProtocolError { detail: String },

    /// The stream could not be opened or broke off.
    TransportFailed { reason: String },
}

impl SessionUpdate {
    pub(crate) fn stage(node: &str, label: &str, transition: StageTransition) -> Self {
        Self::StageEntered {
            node: node.to_string(),
            label: label.to_string(),
            reentered: transition == StageTransition::Reentered,
        }
    }

    /// Check if this update ends the reply (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized { .. } | Self::ProtocolError { .. } | Self::TransportFailed { .. }
        )
    }
}
