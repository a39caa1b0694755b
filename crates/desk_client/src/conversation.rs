//! Conversation - the long-lived owner of the transcript across submissions.

use std::sync::Arc;

use desk_core::{ChatMessage, DeskConfig, TelemetryKind};
use log::info;

use crate::approval::{ApprovalController, ApprovalOutcome};
use crate::backend::{ChatRequest, DeskBackend};
use crate::driver::{StreamDriver, StreamOutcome};
use crate::session::SessionState;

pub const GREETING: &str = "Service desk cluster active. How can I assist you today?";

/// Stage every request passes first; shown before the backend reports anything.
const SCREENING_STAGE: &str = "privacy_shield";
const SCREENING_DETAIL: &str = "Scanning PII...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; the backend was not contacted.
    Rejected,
    Streamed(StreamOutcome),
}

pub struct Conversation {
    backend: Arc<dyn DeskBackend>,
    approvals: ApprovalController,
    config: DeskConfig,
    session: SessionState,
}

impl Conversation {
    pub fn new(backend: Arc<dyn DeskBackend>, config: DeskConfig) -> Self {
        let approvals = ApprovalController::new(Arc::clone(&backend));
        Self {
            backend,
            approvals,
            config,
            session: SessionState::new(vec![ChatMessage::assistant(GREETING)], None),
        }
    }

    /// Continue an existing backend thread.
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.session.assign_thread_id(&thread_id.into());
        self
    }

    /// The current (or most recently finished) session.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.session.thread_id()
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// Send one user message and stream the reply into a fresh session.
    pub async fn submit(&mut self, input: &str, driver: &StreamDriver) -> SubmitOutcome {
        let input = input.trim();
        if input.is_empty() {
            return SubmitOutcome::Rejected;
        }

        let mut session = self.session.successor();
        session.push_message(ChatMessage::user(input));
        session.log(TelemetryKind::Info, "Request dispatched to cluster...");
        session
            .execution_mut()
            .enter_with_detail(SCREENING_STAGE, SCREENING_DETAIL);
        self.session = session;

        let request = ChatRequest::new(input, &self.config)
            .with_thread_id(self.session.thread_id().map(str::to_string));
        info!(
            "Submitting message ({} chars) on thread {:?}",
            input.len(),
            request.thread_id
        );

        let outcome = driver
            .submit(self.backend.as_ref(), &mut self.session, &request)
            .await;
        SubmitOutcome::Streamed(outcome)
    }

    /// Resume the escalated thread of this conversation.
    pub async fn approve_escalation(&mut self) -> ApprovalOutcome {
        self.approvals.approve(&mut self.session).await
    }

    /// Clear the telemetry log of the current session.
    pub fn wipe_telemetry(&mut self) {
        self.session.clear_telemetry();
    }
}
