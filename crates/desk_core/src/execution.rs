//! Execution timeline entries - one per backend processing stage.

use serde::{Deserialize, Serialize};

/// Detail shown for a stage that arrived without an intent.
pub const DEFAULT_STAGE_DETAIL: &str = "Orchestrating...";

/// Human readable labels for the stages the orchestration backend reports.
const STAGE_LABELS: &[(&str, &str)] = &[
    ("privacy_shield", "Privacy Shield"),
    ("supervisor", "Supervisor"),
    ("planner", "Task Planner"),
    ("it", "IT Agent"),
    ("hr", "HR Agent"),
    ("finance", "Finance Agent"),
    ("consume_task", "Decision Merging"),
    ("escalation", "Human Verification"),
    ("merge", "Response Synthesis"),
];

/// Resolve the display label for a stage, falling back to the raw identifier.
pub fn stage_label(node: &str) -> &str {
    STAGE_LABELS
        .iter()
        .find(|(id, _)| *id == node)
        .map(|(_, label)| *label)
        .unwrap_or(node)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionNodeEntry {
    pub node: String,
    pub label: String,
    pub status: NodeStatus,
    pub detail: String,
}

impl ExecutionNodeEntry {
    /// A freshly entered stage.
    pub fn active(node: &str, intent: Option<&str>) -> Self {
        let detail = match intent {
            Some(intent) => format!("Target: {intent}"),
            None => DEFAULT_STAGE_DETAIL.to_string(),
        };
        Self::active_with_detail(node, detail)
    }

    /// A freshly entered stage with a fixed detail line.
    pub fn active_with_detail(node: &str, detail: impl Into<String>) -> Self {
        Self {
            node: node.to_string(),
            label: stage_label(node).to_string(),
            status: NodeStatus::Active,
            detail: detail.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}
