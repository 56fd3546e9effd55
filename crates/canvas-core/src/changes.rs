//! The fine-grained diff an applier produces.

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Result of applying a single operation to a `CanvasState`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<i64>,
    /// Full pre-deletion snapshots, carried for undo.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_nodes: Vec<Node>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.deleted_nodes.is_empty()
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.added.extend(other.added);
        self.updated.extend(other.updated);
        self.removed.extend(other.removed);
        self.deleted_nodes.extend(other.deleted_nodes);
    }
}
