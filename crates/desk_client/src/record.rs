//! Record parser - lines in, stream records out.
//!
//! The backend frames its output as `event:` / `data:` lines. The event kind is
//! sticky until the next `event:` line and may be missing entirely, so each
//! record carries both the declared kind and the effective kind after
//! inference.

use std::fmt;
use std::pin::Pin;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::reader::LineStream;

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<StreamRecord>> + Send>>;

/// Event kinds the backend emits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventKind {
    #[default]
    Message,
    Token,
    Status,
    NodeUpdate,
    FinalResponse,
    Error,
    Other(String),
}

impl EventKind {
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "message" => Self::Message,
            "token" => Self::Token,
            "status" => Self::Status,
            "node_update" => Self::NodeUpdate,
            "final_response" => Self::FinalResponse,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Token => "token",
            Self::Status => "status",
            Self::NodeUpdate => "node_update",
            Self::FinalResponse => "final_response",
            Self::Error => "error",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `data:` line together with the event kind it was framed under.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    /// Kind announced by the most recent `event:` line.
    pub declared_kind: EventKind,
    /// Kind used for dispatch after the token inference rule.
    pub kind: EventKind,
    pub raw_payload: String,
    /// `None` when the payload is not valid JSON.
    pub payload: Option<Value>,
}

impl StreamRecord {
    pub fn parse(declared_kind: EventKind, raw_payload: &str) -> Self {
        let payload = serde_json::from_str::<Value>(raw_payload).ok();
        let kind = infer_kind(&declared_kind, payload.as_ref());
        Self {
            declared_kind,
            kind,
            raw_payload: raw_payload.to_string(),
            payload,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.payload.is_none()
    }

    pub fn is_inferred(&self) -> bool {
        self.kind != self.declared_kind
    }

    /// The payload as a JSON object, if it is one.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref().and_then(Value::as_object)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields()?.get(key)?.as_str()
    }

    pub fn token(&self) -> Option<&str> {
        self.str_field("token")
    }

    pub fn node(&self) -> Option<&str> {
        self.str_field("node")
    }

    pub fn intent(&self) -> Option<&str> {
        self.str_field("intent")
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.str_field("thread_id")
    }

    pub fn response(&self) -> Option<&str> {
        self.str_field("response")
    }

    pub fn detail(&self) -> Option<&str> {
        self.str_field("detail")
    }
}

/// A payload carrying incremental text is a token, whatever it was labelled.
fn infer_kind(declared: &EventKind, payload: Option<&Value>) -> EventKind {
    let carries_token = payload
        .and_then(|value| value.get("token"))
        .and_then(Value::as_str)
        .is_some_and(|token| !token.is_empty());

    if carries_token {
        EventKind::Token
    } else {
        declared.clone()
    }
}

/// Line-by-line parser holding the sticky event kind of one response.
#[derive(Debug, Default)]
pub struct RecordParser {
    current_kind: EventKind,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; only `data:` lines produce a record.
    pub fn feed(&mut self, line: &str) -> Option<StreamRecord> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(kind) = line.strip_prefix(EVENT_PREFIX) {
            self.current_kind = EventKind::from_wire(kind.trim());
            return None;
        }

        if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            return Some(StreamRecord::parse(self.current_kind.clone(), data.trim()));
        }

        log::trace!("Ignoring unrecognized stream line: {}", line);
        None
    }
}

/// Lazily parse a line stream into records, passing transport errors through.
pub fn records(mut lines: LineStream) -> RecordStream {
    Box::pin(stream! {
        let mut parser = RecordParser::new();
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if let Some(record) = parser.feed(&line) {
                        yield Ok(record);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
    })
}
