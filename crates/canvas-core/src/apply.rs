//! Appliers: one per operation kind, each mutating a `CanvasState` in place
//! and returning the fine-grained [`ChangeSet`] the caller broadcasts.
//!
//! Missing node ids are never an error here (spec §4.1, "existence-tolerant"
//! validation): an applier simply skips ids it can't find and returns
//! whatever subset of changes it managed to make.

use serde_json::Value;

use crate::canvas::CanvasState;
use crate::changes::ChangeSet;
use crate::id::IdMinter;
use crate::node::{apply_property_update, Node};
use crate::operation::{LayerDirection, Operation};

fn bbox(nodes: &[Node]) -> ([f64; 2], [f64; 2]) {
    let mut min = [f64::INFINITY, f64::INFINITY];
    let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
    for n in nodes {
        min[0] = min[0].min(n.pos[0]);
        min[1] = min[1].min(n.pos[1]);
        max[0] = max[0].max(n.pos[0] + n.size[0]);
        max[1] = max[1].max(n.pos[1] + n.size[1]);
    }
    (min, max)
}

/// Apply `op` to `state`, minting fresh node ids from `id_minter` where the
/// operation needs one. Returns the resulting [`ChangeSet`].
pub fn apply(state: &mut CanvasState, op: &Operation, id_minter: &IdMinter) -> ChangeSet {
    match op {
        Operation::NodeCreate(p) => {
            let id = p.id.unwrap_or_else(|| id_minter.mint());
            let size = p.size.unwrap_or([100.0, 100.0]);
            let aspect_ratio = p.aspect_ratio.unwrap_or_else(|| size[0] / size[1]);
            let mut node = Node {
                id,
                node_type: p.node_type.clone(),
                pos: p.pos,
                size,
                rotation: p.rotation.unwrap_or(0.0),
                aspect_ratio,
                title: p.title.clone().unwrap_or_default(),
                flags: p.flags.clone().unwrap_or_default(),
                properties: p.properties.clone().unwrap_or_default(),
                tone_curve: None,
                adjustments: None,
                color_balance: None,
                color_adjustments_bypassed: None,
                tone_curve_bypassed: None,
                color_balance_bypassed: None,
                z_index: None,
            };
            if node.is_group() && !node.properties.contains_key("childNodes") {
                node.set_child_node_ids(&[]);
            }
            node.sanitize_inline_src();
            state.insert(node.clone());
            ChangeSet {
                added: vec![node],
                ..Default::default()
            }
        }

        Operation::NodeMove(p) => {
            let mut changes = ChangeSet::default();
            if let (Some(id), Some(position)) = (p.node_id, p.position) {
                if let Some(node) = state.get_mut(id) {
                    node.pos = position;
                    changes.updated.push(node.clone());
                }
            } else if let (Some(ids), Some(positions)) = (&p.node_ids, &p.positions) {
                for (id, pos) in ids.iter().zip(positions.iter()) {
                    if let Some(node) = state.get_mut(*id) {
                        node.pos = *pos;
                        changes.updated.push(node.clone());
                    }
                }
            }
            changes
        }

        Operation::NodeDelete(p) => {
            let mut changes = ChangeSet::default();
            for id in &p.node_ids {
                if let Some(node) = state.remove(*id) {
                    changes.removed.push(*id);
                    changes.deleted_nodes.push(node);
                }
            }
            let mut touched_groups = Vec::new();
            for removed_id in &changes.removed {
                for group_id in state.groups_referencing(*removed_id) {
                    if !touched_groups.contains(&group_id) {
                        touched_groups.push(group_id);
                    }
                }
            }
            for group_id in touched_groups {
                if let Some(group) = state.get_mut(group_id) {
                    let remaining: Vec<i64> = group
                        .child_node_ids()
                        .into_iter()
                        .filter(|id| !changes.removed.contains(id))
                        .collect();
                    group.set_child_node_ids(&remaining);
                    changes.updated.push(group.clone());
                }
            }
            changes
        }

        Operation::NodeResize(p) => {
            let mut changes = ChangeSet::default();
            for (i, id) in p.node_ids.iter().enumerate() {
                let Some(node) = state.get_mut(*id) else {
                    continue;
                };
                let new_size = p.sizes[i];
                if let Some(positions) = &p.positions {
                    node.pos = positions[i];
                } else if node.rotation != 0.0 {
                    let old_center = [
                        node.pos[0] + node.size[0] / 2.0,
                        node.pos[1] + node.size[1] / 2.0,
                    ];
                    node.pos = [
                        old_center[0] - new_size[0] / 2.0,
                        old_center[1] - new_size[1] / 2.0,
                    ];
                }
                node.size = new_size;
                node.aspect_ratio = new_size[0] / new_size[1];
                changes.updated.push(node.clone());
            }
            changes
        }

        Operation::NodeRotate(p) => {
            let mut changes = ChangeSet::default();
            if let (Some(id), Some(angle)) = (p.node_id, p.angle) {
                if let Some(node) = state.get_mut(id) {
                    node.rotation = angle;
                    changes.updated.push(node.clone());
                }
            } else if let (Some(ids), Some(angles)) = (&p.node_ids, &p.angles) {
                for (i, id) in ids.iter().enumerate() {
                    let Some(node) = state.get_mut(*id) else {
                        continue;
                    };
                    node.rotation = angles[i];
                    if let Some(positions) = &p.positions {
                        node.pos = positions[i];
                    }
                    changes.updated.push(node.clone());
                }
            }
            changes
        }

        Operation::NodePropertyUpdate(p) => {
            let mut changes = ChangeSet::default();
            if let Some(node) = state.get_mut(p.node_id) {
                apply_property_update(node, &p.property, &p.value);
                changes.updated.push(node.clone());
            }
            changes
        }

        Operation::NodeBatchPropertyUpdate(p) => {
            let mut changes = ChangeSet::default();
            let mut touched: Vec<i64> = Vec::new();
            for update in &p.updates {
                if let Some(node) = state.get_mut(update.node_id) {
                    apply_property_update(node, &update.property, &update.value);
                    if !touched.contains(&update.node_id) {
                        touched.push(update.node_id);
                    }
                }
            }
            changes.updated = touched.into_iter().filter_map(|id| state.get(id).cloned()).collect();
            changes
        }

        Operation::NodeReset(p) => {
            let mut changes = ChangeSet::default();
            let target_aspect = p.values.as_ref().and_then(|v| v.target_aspect);
            for id in &p.node_ids {
                let Some(node) = state.get_mut(*id) else {
                    continue;
                };
                if p.reset_rotation {
                    node.rotation = 0.0;
                }
                if p.reset_aspect_ratio {
                    if let Some(target) = target_aspect {
                        node.aspect_ratio = target;
                        node.size[1] = node.size[0] / target;
                    }
                }
                changes.updated.push(node.clone());
            }
            changes
        }

        Operation::VideoToggle(p) => {
            let mut changes = ChangeSet::default();
            if let Some(node) = state.get_mut(p.node_id) {
                if node.is_media_video() {
                    let paused = p.paused.unwrap_or_else(|| {
                        !node
                            .properties
                            .get("paused")
                            .and_then(Value::as_bool)
                            .unwrap_or(false)
                    });
                    node.properties.insert("paused".into(), Value::Bool(paused));
                    changes.updated.push(node.clone());
                }
            }
            changes
        }

        Operation::NodeDuplicate(p) => {
            let mut changes = ChangeSet::default();
            if let Some(ids) = &p.node_ids {
                let offset = p.offset.unwrap_or([20.0, 20.0]);
                for id in ids {
                    let Some(src) = state.get(*id) else { continue };
                    let mut clone = src.clone();
                    clone.id = id_minter.mint();
                    clone.pos = [src.pos[0] + offset[0], src.pos[1] + offset[1]];
                    clone.properties.remove("_operationId");
                    state.insert(clone.clone());
                    changes.added.push(clone);
                }
            } else if let Some(data) = &p.node_data {
                let offset = p.offset.unwrap_or([0.0, 0.0]);
                for raw in data {
                    let Ok(mut node) = serde_json::from_value::<Node>(raw.clone()) else {
                        continue;
                    };
                    node.id = id_minter.mint();
                    node.pos = [node.pos[0] + offset[0], node.pos[1] + offset[1]];
                    state.insert(node.clone());
                    changes.added.push(node);
                }
            }
            changes
        }

        Operation::NodePaste(p) => {
            let mut changes = ChangeSet::default();
            let parsed: Vec<Option<Node>> = p
                .node_data
                .iter()
                .map(|raw| serde_json::from_value::<Node>(raw.clone()).ok())
                .collect();
            let present: Vec<Node> = parsed.iter().flatten().cloned().collect();
            if present.is_empty() {
                return changes;
            }
            let (min, max) = bbox(&present);
            let center = [(min[0] + max[0]) / 2.0, (min[1] + max[1]) / 2.0];
            let translate = [
                p.target_position[0] - center[0],
                p.target_position[1] - center[1],
            ];

            let mut index_to_new_id: Vec<Option<i64>> = vec![None; parsed.len()];
            for (idx, maybe_node) in parsed.iter().enumerate() {
                let Some(src) = maybe_node else { continue };
                let mut node = src.clone();
                node.id = id_minter.mint();
                node.pos = [node.pos[0] + translate[0], node.pos[1] + translate[1]];
                if node.is_group() {
                    node.set_child_node_ids(&[]);
                }
                index_to_new_id[idx] = Some(node.id);
                state.insert(node.clone());
                changes.added.push(node);
            }

            for (idx, maybe_node) in parsed.iter().enumerate() {
                let Some(src) = maybe_node else { continue };
                if !src.is_group() {
                    continue;
                }
                let Some(new_id) = index_to_new_id[idx] else { continue };
                let Some(child_indices) = src
                    .properties
                    .get("_pasteChildIndices")
                    .and_then(Value::as_array)
                else {
                    continue;
                };
                let child_ids: Vec<i64> = child_indices
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|i| index_to_new_id.get(i as usize).copied().flatten())
                    .collect();
                if let Some(group) = state.get_mut(new_id) {
                    group.set_child_node_ids(&child_ids);
                    if let Some(pos) = changes.added.iter_mut().find(|n| n.id == new_id) {
                        pos.set_child_node_ids(&child_ids);
                    }
                }
            }
            changes
        }

        Operation::NodeAlign(p) => {
            let mut changes = ChangeSet::default();
            for (i, id) in p.node_ids.iter().enumerate() {
                if let Some(node) = state.get_mut(*id) {
                    node.pos = p.positions[i];
                    changes.updated.push(node.clone());
                }
            }
            changes
        }

        Operation::NodeLayerOrder(p) => {
            let mut changes = ChangeSet::default();
            let _ = (&p.node_ids, p.direction);
            for (id_str, z) in &p.z_index_updates {
                let Ok(id) = id_str.parse::<i64>() else { continue };
                if let Some(node) = state.get_mut(id) {
                    node.z_index = Some(*z);
                    changes.updated.push(node.clone());
                }
            }
            changes
        }

        Operation::ImageUploadComplete(p) => {
            let mut changes = ChangeSet::default();
            let ids: Vec<i64> = state
                .nodes
                .values()
                .filter(|n| {
                    n.is_media_image()
                        && n.properties.get("hash").and_then(Value::as_str) == Some(p.hash.as_str())
                        && !n.properties.contains_key("serverUrl")
                })
                .map(|n| n.id)
                .collect();
            for id in ids {
                if let Some(node) = state.get_mut(id) {
                    node.properties
                        .insert("serverUrl".into(), Value::String(p.server_url.clone()));
                    if let Some(filename) = &p.server_filename {
                        node.properties
                            .insert("serverFilename".into(), Value::String(filename.clone()));
                    }
                    changes.updated.push(node.clone());
                }
            }
            changes
        }

        Operation::GroupCreate(p) => {
            let id = p.id.unwrap_or_else(|| id_minter.mint());
            let child_ids: Vec<i64> = p
                .child_node_ids
                .iter()
                .copied()
                .filter(|cid| state.get(*cid).is_some())
                .collect();
            let mut node = Node {
                id,
                node_type: Node::GROUP.to_string(),
                pos: p.pos,
                size: p.size,
                rotation: 0.0,
                aspect_ratio: p.size[0] / p.size[1],
                title: p.title.clone().unwrap_or_default(),
                flags: Default::default(),
                properties: Default::default(),
                tone_curve: None,
                adjustments: None,
                color_balance: None,
                color_adjustments_bypassed: None,
                tone_curve_bypassed: None,
                color_balance_bypassed: None,
                z_index: None,
            };
            node.set_child_node_ids(&child_ids);
            state.insert(node.clone());
            ChangeSet {
                added: vec![node],
                ..Default::default()
            }
        }

        Operation::GroupAddNode(p) => {
            let mut changes = ChangeSet::default();
            if state.get(p.node_id).is_none() {
                return changes;
            }
            if let Some(group) = state.get_mut(p.group_id) {
                let mut ids = group.child_node_ids();
                if !ids.contains(&p.node_id) {
                    ids.push(p.node_id);
                    group.set_child_node_ids(&ids);
                    changes.updated.push(group.clone());
                }
            }
            changes
        }

        Operation::GroupRemoveNode(p) => {
            let mut changes = ChangeSet::default();
            if let Some(group) = state.get_mut(p.group_id) {
                let ids = group.child_node_ids();
                if ids.contains(&p.node_id) {
                    let remaining: Vec<i64> = ids.into_iter().filter(|id| *id != p.node_id).collect();
                    group.set_child_node_ids(&remaining);
                    changes.updated.push(group.clone());
                }
            }
            changes
        }

        Operation::GroupMove(p) => {
            let mut changes = ChangeSet::default();
            let Some(group) = state.get_mut(p.group_id) else {
                return changes;
            };
            let delta = [p.new_pos[0] - group.pos[0], p.new_pos[1] - group.pos[1]];
            group.pos = p.new_pos;
            changes.updated.push(group.clone());
            let child_ids = group.child_node_ids();
            for child_id in child_ids {
                if let Some(child) = state.get_mut(child_id) {
                    child.pos = [child.pos[0] + delta[0], child.pos[1] + delta[1]];
                    changes.updated.push(child.clone());
                }
            }
            changes
        }

        Operation::GroupResize(p) => {
            let mut changes = ChangeSet::default();
            if let Some(group) = state.get_mut(p.group_id) {
                group.size = p.new_size;
                group.aspect_ratio = p.new_size[0] / p.new_size[1];
                changes.updated.push(group.clone());
            }
            changes
        }

        Operation::GroupToggleCollapsed(p) => {
            let mut changes = ChangeSet::default();
            if let Some(group) = state.get_mut(p.group_id) {
                let collapsed = group
                    .properties
                    .get("isCollapsed")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if collapsed {
                    if let Some(expanded) = group
                        .properties
                        .get("expandedSize")
                        .and_then(Value::as_array)
                        .and_then(|a| {
                            Some([a.first()?.as_f64()?, a.get(1)?.as_f64()?])
                        })
                    {
                        group.size = expanded;
                    }
                    group.properties.insert("isCollapsed".into(), Value::Bool(false));
                } else {
                    group.properties.insert(
                        "expandedSize".into(),
                        Value::Array(vec![group.size[0].into(), group.size[1].into()]),
                    );
                    group.size = [200.0, 40.0];
                    group.properties.insert("isCollapsed".into(), Value::Bool(true));
                }
                changes.updated.push(group.clone());
            }
            changes
        }

        Operation::GroupUpdateStyle(p) => {
            let mut changes = ChangeSet::default();
            if let Some(group) = state.get_mut(p.group_id) {
                group.properties.insert("style".into(), p.style.clone());
                changes.updated.push(group.clone());
            }
            changes
        }
    }
}

/// Silence an unused-import warning for `LayerDirection` (kept public on the
/// params type for callers even though the applier ignores it per the
/// `zIndexUpdates`-is-authoritative rule).
#[allow(dead_code)]
fn _assert_layer_direction_reachable(_: LayerDirection) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{NodeCreateParams, NodeDeleteParams, NodeMoveParams, NodeResizeParams};

    fn fresh_state() -> CanvasState {
        CanvasState::empty(1)
    }

    #[test]
    fn create_then_move() {
        let mut state = fresh_state();
        let minter = IdMinter::new();
        let create = Operation::NodeCreate(NodeCreateParams {
            id: Some(1),
            node_type: "text".into(),
            pos: [10.0, 10.0],
            size: None,
            properties: None,
            rotation: None,
            flags: None,
            title: None,
            aspect_ratio: None,
            image_data: None,
            video_data: None,
        });
        let changes = apply(&mut state, &create, &minter);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(state.get(1).unwrap().pos, [10.0, 10.0]);

        let mv = Operation::NodeMove(NodeMoveParams {
            node_id: Some(1),
            position: Some([50.0, 50.0]),
            node_ids: None,
            positions: None,
        });
        let changes = apply(&mut state, &mv, &minter);
        assert_eq!(changes.updated[0].pos, [50.0, 50.0]);
    }

    #[test]
    fn delete_prunes_group_children() {
        let mut state = fresh_state();
        let minter = IdMinter::new();
        let mut child = Node {
            id: 2,
            node_type: "text".into(),
            pos: [0.0, 0.0],
            size: [10.0, 10.0],
            rotation: 0.0,
            aspect_ratio: 1.0,
            title: String::new(),
            flags: Default::default(),
            properties: Default::default(),
            tone_curve: None,
            adjustments: None,
            color_balance: None,
            color_adjustments_bypassed: None,
            tone_curve_bypassed: None,
            color_balance_bypassed: None,
            z_index: None,
        };
        child.id = 2;
        state.insert(child);
        let mut group = Node {
            id: 3,
            node_type: Node::GROUP.to_string(),
            pos: [0.0, 0.0],
            size: [100.0, 100.0],
            rotation: 0.0,
            aspect_ratio: 1.0,
            title: String::new(),
            flags: Default::default(),
            properties: Default::default(),
            tone_curve: None,
            adjustments: None,
            color_balance: None,
            color_adjustments_bypassed: None,
            tone_curve_bypassed: None,
            color_balance_bypassed: None,
            z_index: None,
        };
        group.set_child_node_ids(&[2]);
        state.insert(group);

        let del = Operation::NodeDelete(NodeDeleteParams { node_ids: vec![2] });
        let changes = apply(&mut state, &del, &minter);
        assert_eq!(changes.removed, vec![2]);
        assert!(state.get(3).unwrap().child_node_ids().is_empty());
    }

    #[test]
    fn resize_with_rotation_preserves_center() {
        let mut state = fresh_state();
        let minter = IdMinter::new();
        let mut node = Node {
            id: 5,
            node_type: "media/image".into(),
            pos: [0.0, 0.0],
            size: [100.0, 100.0],
            rotation: 1.0,
            aspect_ratio: 1.0,
            title: String::new(),
            flags: Default::default(),
            properties: Default::default(),
            tone_curve: None,
            adjustments: None,
            color_balance: None,
            color_adjustments_bypassed: None,
            tone_curve_bypassed: None,
            color_balance_bypassed: None,
            z_index: None,
        };
        node.id = 5;
        state.insert(node);

        let resize = Operation::NodeResize(NodeResizeParams {
            node_ids: vec![5],
            sizes: vec![[50.0, 50.0]],
            positions: None,
        });
        apply(&mut state, &resize, &minter);
        let node = state.get(5).unwrap();
        assert_eq!(node.pos, [25.0, 25.0]);
        assert_eq!(node.aspect_ratio, 1.0);
    }

    #[test]
    fn missing_ids_are_silently_skipped() {
        let mut state = fresh_state();
        let minter = IdMinter::new();
        let mv = Operation::NodeMove(NodeMoveParams {
            node_id: Some(999),
            position: Some([1.0, 1.0]),
            node_ids: None,
            positions: None,
        });
        let changes = apply(&mut state, &mv, &minter);
        assert!(changes.is_empty());
    }
}
