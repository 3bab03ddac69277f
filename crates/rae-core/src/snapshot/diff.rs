//! Difference between a partition's current state and a snapshot.

use std::collections::BTreeMap;

use rae_state::{GraphEdge, GraphNode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a replace restore would change, keyed by record id.
///
/// "added" records exist only in the snapshot, "removed" only in the
/// current state, "modified" in both with different contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub nodes_added: Vec<Uuid>,
    pub nodes_removed: Vec<Uuid>,
    pub nodes_modified: Vec<Uuid>,
    pub edges_added: Vec<Uuid>,
    pub edges_removed: Vec<Uuid>,
    pub edges_modified: Vec<Uuid>,
}

impl SnapshotDiff {
    pub fn compute(
        current_nodes: &[GraphNode],
        current_edges: &[GraphEdge],
        snapshot_nodes: &[GraphNode],
        snapshot_edges: &[GraphEdge],
    ) -> Self {
        let (nodes_added, nodes_removed, nodes_modified) = split(
            current_nodes.iter().map(|n| (n.id, n)),
            snapshot_nodes.iter().map(|n| (n.id, n)),
        );
        let (edges_added, edges_removed, edges_modified) = split(
            current_edges.iter().map(|e| (e.id, e)),
            snapshot_edges.iter().map(|e| (e.id, e)),
        );
        Self {
            nodes_added,
            nodes_removed,
            nodes_modified,
            edges_added,
            edges_removed,
            edges_modified,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    pub fn change_count(&self) -> usize {
        self.nodes_added.len()
            + self.nodes_removed.len()
            + self.nodes_modified.len()
            + self.edges_added.len()
            + self.edges_removed.len()
            + self.edges_modified.len()
    }
}

fn split<'a, T: PartialEq + 'a>(
    current: impl Iterator<Item = (Uuid, &'a T)>,
    snapshot: impl Iterator<Item = (Uuid, &'a T)>,
) -> (Vec<Uuid>, Vec<Uuid>, Vec<Uuid>) {
    let current: BTreeMap<Uuid, &T> = current.collect();
    let snapshot: BTreeMap<Uuid, &T> = snapshot.collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (id, record) in &snapshot {
        match current.get(id) {
            None => added.push(*id),
            Some(existing) if existing != record => modified.push(*id),
            Some(_) => {}
        }
    }
    let removed = current
        .keys()
        .filter(|id| !snapshot.contains_key(id))
        .copied()
        .collect();
    (added, removed, modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rae_state::Scope;

    #[test]
    fn diff_classifies_changes() {
        let scope = Scope::new("t", "p");
        let a = GraphNode::new(&scope, "a", "A");
        let b = GraphNode::new(&scope, "b", "B");
        let c = GraphNode::new(&scope, "c", "C");
        let mut b_renamed = b.clone();
        b_renamed.label = "Bee".into();

        let diff = SnapshotDiff::compute(&[a.clone(), b_renamed], &[], &[b.clone(), c.clone()], &[]);
        assert_eq!(diff.nodes_added, vec![c.id]);
        assert_eq!(diff.nodes_removed, vec![a.id]);
        assert_eq!(diff.nodes_modified, vec![b.id]);
        assert_eq!(diff.change_count(), 3);
    }

    #[test]
    fn identical_state_is_empty() {
        let scope = Scope::new("t", "p");
        let a = GraphNode::new(&scope, "a", "A");
        let diff = SnapshotDiff::compute(&[a.clone()], &[], &[a], &[]);
        assert!(diff.is_empty());
    }
}
