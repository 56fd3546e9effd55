//! Computing and applying the inverse of a recorded operation (spec §4.3,
//! "Inverse semantics").
//!
//! The client-supplied `undoData` envelope is preferred; it is a loose bag
//! where any subset of keys may be present. Only `node_create` has a
//! built-in fallback when `undoData` is absent — every other op type simply
//! skips (with a warning) if the client didn't send one, matching the
//! spec's "not fatal" guidance.

use canvas_core::{CanvasState, ChangeSet, Node};
use canvas_store::OperationRecord;
use serde_json::{Map, Value};

fn as_id_map_vec2(undo_data: &Value, key: &str) -> Option<Map<String, Value>> {
    undo_data.get(key)?.as_object().cloned()
}

fn parse_vec2(v: &Value) -> Option<[f64; 2]> {
    let arr = v.as_array()?;
    Some([arr.first()?.as_f64()?, arr.get(1)?.as_f64()?])
}

/// Apply `undoData` (if present) or type-specific fallback logic to reverse
/// one operation row against a resident scene. Returns whatever changes
/// were actually made (possibly empty, if the op type has no inverse).
pub fn apply_inverse(state: &mut CanvasState, op: &OperationRecord) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let params: Value = serde_json::from_str(&op.params).unwrap_or(Value::Null);
    let undo_data: Option<Value> = op
        .undo_data
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());

    let Some(undo_data) = undo_data else {
        apply_fallback(state, &op.op_type, &params, &mut changes);
        return changes;
    };

    if let Some(deleted) = undo_data.get("deletedNodes").and_then(Value::as_array) {
        for raw in deleted {
            if let Ok(node) = serde_json::from_value::<Node>(raw.clone()) {
                state.insert(node.clone());
                changes.added.push(node);
            }
        }
    }

    if let Some(created) = undo_data.get("createdNodeIds").and_then(Value::as_array) {
        for id in created.iter().filter_map(Value::as_i64) {
            if let Some(node) = state.remove(id) {
                changes.removed.push(id);
                changes.deleted_nodes.push(node);
            }
        }
    }

    if let Some(map) = as_id_map_vec2(&undo_data, "previousPositions") {
        for (id_str, v) in map {
            if let (Ok(id), Some(pos)) = (id_str.parse::<i64>(), parse_vec2(&v)) {
                if let Some(node) = state.get_mut(id) {
                    node.pos = pos;
                    changes.updated.push(node.clone());
                }
            }
        }
    }

    if let Some(map) = as_id_map_vec2(&undo_data, "previousSizes") {
        for (id_str, v) in map {
            if let (Ok(id), Some(size)) = (id_str.parse::<i64>(), parse_vec2(&v)) {
                if let Some(node) = state.get_mut(id) {
                    node.size = size;
                    node.aspect_ratio = size[0] / size[1];
                    changes.updated.push(node.clone());
                }
            }
        }
    }

    if let Some(map) = undo_data.get("previousRotations").and_then(Value::as_object) {
        for (id_str, v) in map {
            if let (Ok(id), Some(rotation)) = (id_str.parse::<i64>(), v.as_f64()) {
                if let Some(node) = state.get_mut(id) {
                    node.rotation = rotation;
                    changes.updated.push(node.clone());
                }
            }
        }
    }

    if let Some(map) = undo_data
        .get("previousAspectRatios")
        .and_then(Value::as_object)
    {
        for (id_str, v) in map {
            if let (Ok(id), Some(ratio)) = (id_str.parse::<i64>(), v.as_f64()) {
                if let Some(node) = state.get_mut(id) {
                    node.aspect_ratio = ratio;
                    changes.updated.push(node.clone());
                }
            }
        }
    }

    if let Some(map) = undo_data
        .get("previousProperties")
        .and_then(Value::as_object)
    {
        for (id_str, v) in map {
            if let (Ok(id), Some(props)) = (id_str.parse::<i64>(), v.as_object()) {
                if let Some(node) = state.get_mut(id) {
                    node.merge_properties(props);
                    changes.updated.push(node.clone());
                }
            }
        }
    }

    if let Some(map) = undo_data.get("previousState").and_then(Value::as_object) {
        for (id_str, v) in map {
            if let (Ok(id), Some(partial)) = (id_str.parse::<i64>(), v.as_object()) {
                if let Some(node) = state.get_mut(id) {
                    merge_partial_node(node, partial);
                    changes.updated.push(node.clone());
                }
            }
        }
    }

    if let Some(arr) = undo_data.get("nodes").and_then(Value::as_array) {
        for entry in arr {
            let Some(id) = entry.get("id").and_then(Value::as_i64) else {
                continue;
            };
            let Some(pos) = entry.get("oldPosition").and_then(parse_vec2) else {
                continue;
            };
            if let Some(node) = state.get_mut(id) {
                node.pos = pos;
                changes.updated.push(node.clone());
            }
        }
    }

    if let Some(id) = undo_data.get("nodeId").and_then(Value::as_i64) {
        if let Some(node) = state.remove(id) {
            changes.removed.push(id);
            changes.deleted_nodes.push(node);
        }
    }

    changes
}

/// Apply known direct-attribute keys, everything else into `properties`.
fn merge_partial_node(node: &mut Node, partial: &Map<String, Value>) {
    for (key, value) in partial {
        canvas_core::apply_property_update(node, key, value);
    }
}

fn apply_fallback(state: &mut CanvasState, op_type: &str, params: &Value, changes: &mut ChangeSet) {
    match op_type {
        "node_create" => {
            if let Some(id) = params.get("id").and_then(Value::as_i64) {
                if let Some(node) = state.remove(id) {
                    changes.removed.push(id);
                    changes.deleted_nodes.push(node);
                }
            }
        }
        other => {
            tracing::warn!(op_type = other, "no inverse logic for operation; skipping undo");
        }
    }
}
