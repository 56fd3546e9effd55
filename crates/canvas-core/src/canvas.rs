//! The in-memory authoritative scene, loaded lazily and resident until
//! process exit (spec §3, "Lifecycles").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::Node;

/// On-disk shape of `canvases.canvas_data`.
#[derive(Debug, Serialize, Deserialize)]
struct SceneBlob {
    nodes: Vec<Node>,
    version: i64,
}

/// The authoritative in-memory scene for one canvas.
#[derive(Debug, Clone)]
pub struct CanvasState {
    pub canvas_id: i64,
    pub nodes: HashMap<i64, Node>,
    pub version: i64,
    pub last_modified: DateTime<Utc>,
}

impl CanvasState {
    /// An empty scene, used when creating a brand new canvas.
    pub fn empty(canvas_id: i64) -> Self {
        Self {
            canvas_id,
            nodes: HashMap::new(),
            version: 0,
            last_modified: Utc::now(),
        }
    }

    /// Parse a `canvas_data` blob loaded from persistence.
    pub fn from_blob(canvas_id: i64, blob: &str, last_modified: DateTime<Utc>) -> Result<Self> {
        if blob.trim().is_empty() {
            return Ok(Self::empty(canvas_id));
        }
        let parsed: SceneBlob = serde_json::from_str(blob)?;
        let nodes = parsed.nodes.into_iter().map(|n| (n.id, n)).collect();
        Ok(Self {
            canvas_id,
            nodes,
            version: parsed.version,
            last_modified,
        })
    }

    /// Serialize back to the `canvas_data` wire shape, nodes in a
    /// deterministic (id-sorted) order so byte-identical states round-trip
    /// to byte-identical blobs.
    pub fn to_blob(&self) -> Result<String> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.id);
        let blob = SceneBlob {
            nodes: nodes.into_iter().cloned().collect(),
            version: self.version,
        };
        Ok(serde_json::to_string(&blob)?)
    }

    pub fn get(&self, id: i64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub fn remove(&mut self, id: i64) -> Option<Node> {
        self.nodes.remove(&id)
    }

    /// Every group node whose `childNodes` references `id`; used to prune
    /// dangling references on delete.
    pub fn groups_referencing(&self, id: i64) -> Vec<i64> {
        self.nodes
            .values()
            .filter(|n| n.is_group() && n.child_node_ids().contains(&id))
            .map(|n| n.id)
            .collect()
    }

    pub fn require(&self, id: i64) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::Validation(format!("node {id} does not exist")))
    }
}
