//! Whole-pipeline properties: bytes in, session state out.

use bytes::Bytes;
use desk_client::{ByteStream, SessionState, StreamDriver, StreamOutcome};
use desk_core::{NodeStatus, Role, TelemetryKind};
use futures::stream;

const BODY: &str = concat!(
    "event: status\r\n",
    "data: {\"node\":\"init\",\"thread_id\":\"th-42\",\"provider\":\"openai\"}\r\n",
    "\r\n",
    "event: node_update\r\n",
    "data: {\"node\":\"privacy_shield\",\"intent\":null}\r\n",
    "\r\n",
    "data: {\"node\":\"supervisor\",\"intent\":\"it\"}\r\n",
    "\r\n",
    "data: {\"token\":\"Réinitialisation \"}\n",
    "data: {\"token\":\"du mot de passe \"}\n",
    "data: {\"token\": nope\n",
    "data: {\"token\":\"— ticket créé ✅\"}\n",
    "event: node_update\n",
    "data: {\"node\":\"it\",\"intent\":\"password_reset\",\"ticket_id\":\"INC-1001\"}\n",
    "data: {\"node\":\"merge\"}\n",
    "event: final_response\n",
    "data: {\"response\":\"Password reset ticket INC-1001 created.\",\"ticket_id\":\"INC-1001\",\"escalation\":false}\n",
);

/// Comparable view of a session, ignoring generated ids and timestamps.
#[derive(Debug, PartialEq)]
struct Snapshot {
    thread_id: Option<String>,
    messages: Vec<(Role, String, bool, Option<String>)>,
    timeline: Vec<(String, NodeStatus, String)>,
    telemetry: Vec<(TelemetryKind, String)>,
}

fn snapshot(session: &SessionState) -> Snapshot {
    Snapshot {
        thread_id: session.thread_id().map(str::to_string),
        messages: session
            .messages()
            .iter()
            .map(|m| {
                (
                    m.role(),
                    m.content().to_string(),
                    m.is_streaming(),
                    m.ticket_id().map(str::to_string),
                )
            })
            .collect(),
        timeline: session
            .execution_log()
            .iter()
            .map(|e| (e.node.clone(), e.status, e.detail.clone()))
            .collect(),
        telemetry: session
            .telemetry_log()
            .iter()
            .map(|e| (e.kind, e.msg.clone()))
            .collect(),
    }
}

fn chunked(bytes: &[u8], cuts: &[usize]) -> ByteStream {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        chunks.push(Ok(Bytes::copy_from_slice(&bytes[start..cut])));
        start = cut;
    }
    chunks.push(Ok(Bytes::copy_from_slice(&bytes[start..])));
    Box::pin(stream::iter(chunks))
}

async fn run(body: ByteStream) -> (StreamOutcome, SessionState) {
    let mut session = SessionState::default();
    let outcome = StreamDriver::new().drive(&mut session, body).await;
    (outcome, session)
}

#[tokio::test]
async fn single_chunk_delivery_builds_expected_state() {
    let (outcome, session) = run(chunked(BODY.as_bytes(), &[])).await;

    assert_eq!(outcome, StreamOutcome::Completed { records: 10 });
    assert_eq!(session.thread_id(), Some("th-42"));

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content(), "Password reset ticket INC-1001 created.");
    assert!(!messages[0].is_streaming());
    assert_eq!(messages[0].ticket_id(), Some("INC-1001"));

    let nodes: Vec<_> = session
        .execution_log()
        .iter()
        .map(|e| e.label.as_str())
        .collect();
    assert_eq!(
        nodes,
        vec![
            "init",
            "Privacy Shield",
            "Supervisor",
            "IT Agent",
            "Response Synthesis"
        ]
    );
    assert_eq!(session.execution().active_count(), 1);
    assert_eq!(
        session.telemetry_log().last().map(|e| e.kind),
        Some(TelemetryKind::Success)
    );
}

#[tokio::test]
async fn every_two_way_split_reconstructs_the_same_state() {
    let bytes = BODY.as_bytes();
    let (_, reference) = run(chunked(bytes, &[])).await;
    let expected = snapshot(&reference);

    for cut in 1..bytes.len() {
        let (_, session) = run(chunked(bytes, &[cut])).await;
        assert_eq!(snapshot(&session), expected, "split at byte {cut}");
    }
}

#[tokio::test]
async fn small_fixed_size_chunks_reconstruct_the_same_state() {
    let bytes = BODY.as_bytes();
    let (_, reference) = run(chunked(bytes, &[])).await;
    let expected = snapshot(&reference);

    for size in 1..=7 {
        let cuts: Vec<usize> = (size..bytes.len()).step_by(size).collect();
        let (_, session) = run(chunked(bytes, &cuts)).await;
        assert_eq!(snapshot(&session), expected, "chunk size {size}");
    }
}

#[tokio::test]
async fn tokens_concatenate_in_order_and_survive_bad_lines() {
    let body = concat!(
        "event: token\n",
        "data: {\"token\":\"1\"}\n",
        "data: {\"token\":\"2\"}\n",
        "data: not json at all\n",
        "data: {\"token\":\"3\"}\n",
        "data: {\"token\":\"4\"}\n",
    );

    for size in [1, 3, 5, 64] {
        let bytes = body.as_bytes();
        let cuts: Vec<usize> = (size..bytes.len()).step_by(size).collect();
        let (_, session) = run(chunked(bytes, &cuts)).await;

        let pending = session.pending_message().expect("pending message");
        assert_eq!(pending.content(), "1234", "chunk size {size}");
        assert!(pending.is_streaming());
    }
}

#[tokio::test]
async fn at_most_one_stage_is_active_after_every_prefix() {
    let lines: Vec<&str> = BODY.split_inclusive('\n').collect();

    for end in 0..=lines.len() {
        let prefix: String = lines[..end].concat();
        let (_, session) = run(chunked(prefix.as_bytes(), &[])).await;
        assert!(
            session.execution().active_count() <= 1,
            "prefix of {end} lines"
        );
    }
}

#[tokio::test]
async fn terminal_response_wins_over_streamed_tokens() {
    let body = concat!(
        "data: {\"token\":\"Hel\"}\n",
        "data: {\"token\":\"lo wor\"}\n",
        "event: final_response\n",
        "data: {\"response\":\"Hello\",\"thread_id\":\"abc\"}",
    );

    let (_, session) = run(chunked(body.as_bytes(), &[7, 30])).await;

    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].content(), "Hello");
    assert!(!session.messages()[0].is_streaming());
    assert_eq!(session.thread_id(), Some("abc"));
}
