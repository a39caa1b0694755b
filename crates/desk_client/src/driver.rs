//! Stream driver - runs one submission from body to frozen state.

use desk_core::{ChatMessage, TelemetryKind};
use futures_util::StreamExt;
use log::{error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{ByteStream, ChatRequest, DeskBackend};
use crate::dispatcher::Dispatcher;
use crate::error::DeskError;
use crate::reader::lines;
use crate::record::records;
use crate::session::SessionState;
use crate::update::SessionUpdate;

pub const CONNECTIVITY_FAILURE_MESSAGE: &str =
    "Cluster connectivity failure. Ensure the service desk backend is running.";

/// How a stream run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The body ended normally.
    Completed { records: usize },
    /// The cancellation token fired; the body was released.
    Cancelled { records: usize },
    /// The stream could not be opened or broke off.
    Failed { records: usize, reason: String },
}

impl StreamOutcome {
    pub fn records(&self) -> usize {
        match self {
            Self::Completed { records }
            | Self::Cancelled { records }
            | Self::Failed { records, .. } => *records,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamDriver {
    update_tx: Option<mpsc::Sender<SessionUpdate>>,
    cancel_token: CancellationToken,
}

impl StreamDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_updates(mut self, update_tx: mpsc::Sender<SessionUpdate>) -> Self {
        self.update_tx = Some(update_tx);
        self
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// Open the chat stream and drive it to completion.
    pub async fn submit(
        &self,
        backend: &dyn DeskBackend,
        session: &mut SessionState,
        request: &ChatRequest,
    ) -> StreamOutcome {
        let body = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                info!("Submission cancelled before the stream opened");
                return StreamOutcome::Cancelled { records: 0 };
            }
            body = backend.open_chat_stream(request) => body,
        };

        match body {
            Ok(body) => self.drive(session, body).await,
            Err(err) => self.fail(session, &err, 0).await,
        }
    }

    /// Apply every record of `body` to `session` in arrival order.
    pub async fn drive(&self, session: &mut SessionState, body: ByteStream) -> StreamOutcome {
        let mut records = records(lines(body));
        let mut applied = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("Stream cancelled after {} records", applied);
                    return StreamOutcome::Cancelled { records: applied };
                }
                next = records.next() => next,
            };

            match next {
                Some(Ok(record)) => {
                    let updates = Dispatcher::new(session).apply(&record);
                    applied += 1;
                    self.publish(updates).await;
                }
                Some(Err(err)) => return self.fail(session, &err, applied).await,
                None => break,
            }
        }

        info!("Stream completed after {} records", applied);
        StreamOutcome::Completed { records: applied }
    }

    async fn fail(
        &self,
        session: &mut SessionState,
        err: &DeskError,
        records: usize,
    ) -> StreamOutcome {
        error!("Chat stream failed: {}", err);
        let reason = err.to_string();
        session.log(TelemetryKind::Error, format!("Cluster error: {reason}"));
        session.push_message(ChatMessage::assistant(CONNECTIVITY_FAILURE_MESSAGE));
        self.publish(vec![SessionUpdate::TransportFailed {
            reason: reason.clone(),
        }])
        .await;
        StreamOutcome::Failed { records, reason }
    }

    async fn publish(&self, updates: Vec<SessionUpdate>) {
        let Some(tx) = &self.update_tx else {
            return;
        };
        for update in updates {
            // A dropped receiver only means nobody is rendering.
            let _ = tx.send(update).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;

    fn body(chunks: &[&'static str]) -> ByteStream {
        let chunks: Vec<_> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn drive_applies_records_and_publishes_updates() {
        let (tx, mut rx) = mpsc::channel(16);
        let driver = StreamDriver::new().with_updates(tx);
        let mut session = SessionState::default();

        let outcome = driver
            .drive(
                &mut session,
                body(&[
                    "event: token\ndata: {\"tok",
                    "en\":\"Hi\"}\n\nevent: final_response\n",
                    "data: {\"response\":\"Hi!\",\"thread_id\":\"t-9\"}\n",
                ]),
            )
            .await;
        drop(driver);

        assert_eq!(outcome, StreamOutcome::Completed { records: 2 });
        assert_eq!(session.pending_message().map(|m| m.content()), Some("Hi!"));

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert_eq!(updates.len(), 3);
        assert!(updates[2].is_terminal());
    }

    #[tokio::test]
    async fn transport_error_appends_one_synthetic_message() {
        let driver = StreamDriver::new();
        let mut session = SessionState::default();
        let failing: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"token\":\"par\"}\n")),
            Err(DeskError::Stream("reset by peer".to_string())),
        ]));

        let outcome = driver.drive(&mut session, failing).await;

        assert_eq!(outcome.records(), 1);
        assert!(matches!(outcome, StreamOutcome::Failed { .. }));
        let contents: Vec<_> = session.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["par", CONNECTIVITY_FAILURE_MESSAGE]);
        assert_eq!(
            session.telemetry_log().last().map(|e| e.kind),
            Some(TelemetryKind::Error)
        );
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_reading() {
        let token = CancellationToken::new();
        token.cancel();
        let driver = StreamDriver::new().with_cancel_token(token);
        let mut session = SessionState::default();

        let outcome = driver
            .drive(&mut session, body(&["data: {\"token\":\"x\"}\n"]))
            .await;

        assert_eq!(outcome, StreamOutcome::Cancelled { records: 0 });
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_stream_keeps_applied_records() {
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let driver = StreamDriver::new()
            .with_updates(tx)
            .with_cancel_token(token.clone());
        let stalled: ByteStream = Box::pin(
            stream::iter(vec![Ok::<_, DeskError>(Bytes::from_static(
                b"data: {\"token\":\"Hel\"}\n",
            ))])
            .chain(stream::pending()),
        );

        let canceller = tokio::spawn(async move {
            let first = rx.recv().await;
            token.cancel();
            first
        });

        let mut session = SessionState::default();
        let outcome = driver.drive(&mut session, stalled).await;

        assert_eq!(outcome, StreamOutcome::Cancelled { records: 1 });
        assert!(matches!(
            canceller.await.expect("canceller task"),
            Some(SessionUpdate::TokenAppended { .. })
        ));
        let pending = session.pending_message().expect("pending message");
        assert_eq!(pending.content(), "Hel");
        assert!(pending.is_streaming());
        assert!(!session
            .messages()
            .iter()
            .any(|m| m.content() == CONNECTIVITY_FAILURE_MESSAGE));
    }
}
