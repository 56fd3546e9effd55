//! Extracting the set of node ids an operation's params touch, used for
//! undo conflict detection (spec §4.3, "Conflict detection").

use serde_json::Value;

/// Recursively collect every node id referenced under a `nodeId`/`groupId`
/// (scalar) or `nodeIds`/`childNodeIds` (array) key anywhere in `params`.
/// Generic rather than per-op-type so new operation kinds with the same
/// naming convention need no change here.
pub fn touched_node_ids(params: &Value) -> Vec<i64> {
    let mut ids = Vec::new();
    scan(params, &mut ids);
    ids
}

fn scan(value: &Value, out: &mut Vec<i64>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match key.as_str() {
                    "nodeId" | "groupId" => {
                        if let Some(id) = v.as_i64() {
                            out.push(id);
                        }
                    }
                    "nodeIds" | "childNodeIds" => {
                        if let Some(arr) = v.as_array() {
                            out.extend(arr.iter().filter_map(Value::as_i64));
                        }
                    }
                    _ => {}
                }
                scan(v, out);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                scan(v, out);
            }
        }
        _ => {}
    }
}
