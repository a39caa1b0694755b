//! Chat transcript messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Keys owned by the message itself; a final payload never overrides them.
const RESERVED_KEYS: &[&str] = &["id", "role", "content", "streaming", "response"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the chat transcript.
///
/// While `streaming` is true the content only grows through [`ChatMessage::append`].
/// Once the message is finalized its content can no longer change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: String,
    role: Role,
    content: String,
    #[serde(default)]
    streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ticket_id: Option<String>,
    /// Passthrough fields carried over from the final payload.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ChatMessage {
    fn new(id: String, role: Role, content: String, streaming: bool) -> Self {
        Self {
            id,
            role,
            content,
            streaming,
            ticket_id: None,
            extra: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), Role::User, content.into(), false)
    }

    /// A complete assistant message (notices, diagnostics, confirmations).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            Role::Assistant,
            content.into(),
            false,
        )
    }

    /// An assistant message that is still receiving tokens.
    pub fn streaming_assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id.into(), Role::Assistant, content.into(), true)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn ticket_id(&self) -> Option<&str> {
        self.ticket_id.as_deref()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Append incremental text. Returns `false` when the message is already final.
    pub fn append(&mut self, text: &str) -> bool {
        if !self.streaming {
            return false;
        }
        self.content.push_str(text);
        true
    }

    /// Replace the content with the authoritative text and freeze the message.
    ///
    /// Non-null payload fields are merged in; fields already present are
    /// overwritten but never removed. Returns `false` when the message is
    /// already final, leaving it untouched.
    pub fn finalize(&mut self, content: &str, payload: &Map<String, Value>) -> bool {
        if !self.streaming {
            return false;
        }
        self.content = content.to_string();
        self.streaming = false;
        self.merge_fields(payload);
        true
    }

    fn merge_fields(&mut self, payload: &Map<String, Value>) {
        for (key, value) in payload {
            if value.is_null() || RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if key == "ticket_id" {
                match value {
                    Value::String(ticket) => self.ticket_id = Some(ticket.clone()),
                    other => self.ticket_id = Some(other.to_string()),
                }
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
    }
}
