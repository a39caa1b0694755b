//! Execution graph reconciler.
//!
//! Keeps the ordered stage timeline with at most one active entry. Entries are
//! never removed or duplicated; a stage seen again is flipped in place.

use desk_core::{ExecutionNodeEntry, NodeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    /// A new stage was appended as the active entry.
    Entered,
    /// A stage already on the timeline became active again.
    Reentered,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    entries: Vec<ExecutionNodeEntry>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` the single active stage.
    pub fn enter(&mut self, node: &str, intent: Option<&str>) -> StageTransition {
        self.activate(node, || ExecutionNodeEntry::active(node, intent))
    }

    /// Like [`ExecutionGraph::enter`], with a fixed detail line for a new entry.
    pub fn enter_with_detail(&mut self, node: &str, detail: &str) -> StageTransition {
        self.activate(node, || ExecutionNodeEntry::active_with_detail(node, detail))
    }

    fn activate(
        &mut self,
        node: &str,
        new_entry: impl FnOnce() -> ExecutionNodeEntry,
    ) -> StageTransition {
        if let Some(index) = self.entries.iter().position(|entry| entry.node == node) {
            self.complete_active(Some(index));
            self.entries[index].status = NodeStatus::Active;
            return StageTransition::Reentered;
        }

        self.complete_active(None);
        self.entries.push(new_entry());
        StageTransition::Entered
    }

    fn complete_active(&mut self, keep: Option<usize>) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if Some(index) != keep && entry.is_active() {
                entry.status = NodeStatus::Completed;
            }
        }
    }

    pub fn entries(&self) -> &[ExecutionNodeEntry] {
        &self.entries
    }

    pub fn active(&self) -> Option<&ExecutionNodeEntry> {
        self.entries.iter().find(|entry| entry.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_active()).count()
    }

    pub fn get(&self, node: &str) -> Option<&ExecutionNodeEntry> {
        self.entries.iter().find(|entry| entry.node == node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stage_completes_previous_one() {
        let mut graph = ExecutionGraph::new();
        assert!(graph.active().is_none());

        assert_eq!(graph.enter("supervisor", None), StageTransition::Entered);
        assert_eq!(graph.enter("it", Some("vpn_access")), StageTransition::Entered);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.entries()[0].status, NodeStatus::Completed);
        let active = graph.active().expect("active stage");
        assert_eq!(active.node, "it");
        assert_eq!(active.detail, "Target: vpn_access");
    }

    #[test]
    fn reentry_flips_in_place_without_duplicating() {
        let mut graph = ExecutionGraph::new();
        graph.enter("planner", Some("multi"));
        graph.enter("hr", None);

        assert_eq!(graph.enter("planner", None), StageTransition::Reentered);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.active().map(|e| e.node.as_str()), Some("planner"));
        assert_eq!(graph.get("hr").map(|e| e.status), Some(NodeStatus::Completed));
        assert_eq!(graph.get("planner").map(|e| e.detail.as_str()), Some("Target: multi"));
    }

    #[test]
    fn at_most_one_active_after_every_step() {
        let mut graph = ExecutionGraph::new();
        for node in ["init", "supervisor", "it", "init", "merge", "merge", "finance"] {
            graph.enter(node, None);
            assert_eq!(graph.active_count(), 1, "after entering {node}");
        }
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn seeded_stage_is_reentered_not_duplicated() {
        let mut graph = ExecutionGraph::new();
        graph.enter_with_detail("privacy_shield", "Scanning PII...");
        assert_eq!(graph.active().map(|e| e.label.as_str()), Some("Privacy Shield"));

        graph.enter("supervisor", None);
        assert_eq!(graph.enter("privacy_shield", None), StageTransition::Reentered);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.entries()[0].detail, "Scanning PII...");
        assert_eq!(graph.active_count(), 1);
    }
}
