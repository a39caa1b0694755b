//! Approval controller - resumes a session paused for human confirmation.

use std::sync::Arc;

use desk_core::{ChatMessage, TelemetryKind};
use log::{error, info, warn};

use crate::backend::DeskBackend;
use crate::session::SessionState;

pub const APPROVAL_CONFIRMATION: &str = "Manual escalation approved. Resuming cycle...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The backend accepted the resume request.
    Resumed,
    /// No thread identity is known, so there is nothing to resume.
    Rejected,
    /// The request failed; the failure was logged.
    Failed(String),
}

#[derive(Clone)]
pub struct ApprovalController {
    backend: Arc<dyn DeskBackend>,
}

impl ApprovalController {
    pub fn new(backend: Arc<dyn DeskBackend>) -> Self {
        Self { backend }
    }

    /// Resume the thread bound to `session`.
    ///
    /// Failures are recorded in the session and the log rather than returned.
    pub async fn approve(&self, session: &mut SessionState) -> ApprovalOutcome {
        let Some(thread_id) = session.thread_id().map(str::to_string) else {
            warn!("Approval requested without a thread id; ignoring");
            return ApprovalOutcome::Rejected;
        };

        session.log(TelemetryKind::Hitl, "User override sent.");

        match self.backend.resume_thread(&thread_id).await {
            Ok(()) => {
                info!("Thread {} resumed", thread_id);
                session.push_message(ChatMessage::assistant(APPROVAL_CONFIRMATION));
                ApprovalOutcome::Resumed
            }
            Err(err) => {
                error!("Escalation approval for {} failed: {}", thread_id, err);
                session.log(
                    TelemetryKind::Error,
                    format!("Escalation approval failed: {err}"),
                );
                ApprovalOutcome::Failed(err.to_string())
            }
        }
    }
}
