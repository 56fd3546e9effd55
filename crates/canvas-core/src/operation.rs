//! The closed operation catalog.
//!
//! One variant per kind in the catalog; each carries only the fields it
//! needs. This gives exhaustive `match` coverage in the validator and
//! applier instead of runtime type switching over a dynamic `properties`
//! bag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A single `{property, value}` write, used by `node_batch_property_update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyUpdate {
    pub node_id: i64,
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreateParams {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub node_type: String,
    pub pos: [f64; 2],
    #[serde(default)]
    pub size: Option<[f64; 2]>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub flags: Option<Map<String, Value>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<f64>,
    /// Present only to be rejected: callers must upload media via HTTP, not
    /// embed it inline.
    #[serde(default)]
    pub image_data: Option<Value>,
    #[serde(default)]
    pub video_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMoveParams {
    #[serde(default)]
    pub node_id: Option<i64>,
    #[serde(default)]
    pub position: Option<[f64; 2]>,
    #[serde(default)]
    pub node_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub positions: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeleteParams {
    pub node_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResizeParams {
    pub node_ids: Vec<i64>,
    pub sizes: Vec<[f64; 2]>,
    #[serde(default)]
    pub positions: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRotateParams {
    #[serde(default)]
    pub node_id: Option<i64>,
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub node_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub angles: Option<Vec<f64>>,
    #[serde(default)]
    pub positions: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePropertyUpdateParams {
    pub node_id: i64,
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBatchPropertyUpdateParams {
    pub updates: Vec<PropertyUpdate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResetValues {
    #[serde(default)]
    pub target_aspect: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResetParams {
    pub node_ids: Vec<i64>,
    #[serde(default)]
    pub reset_rotation: bool,
    #[serde(default)]
    pub reset_aspect_ratio: bool,
    #[serde(default)]
    pub values: Option<NodeResetValues>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoToggleParams {
    pub node_id: i64,
    #[serde(default)]
    pub paused: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDuplicateParams {
    #[serde(default)]
    pub node_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub node_data: Option<Vec<Value>>,
    #[serde(default)]
    pub offset: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePasteParams {
    pub node_data: Vec<Value>,
    pub target_position: [f64; 2],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlignAxis {
    Horizontal,
    Vertical,
    Grid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAlignParams {
    pub node_ids: Vec<i64>,
    pub axis: AlignAxis,
    pub positions: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayerDirection {
    Up,
    Down,
    Front,
    Back,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLayerOrderParams {
    pub node_ids: Vec<i64>,
    pub direction: LayerDirection,
    pub z_index_updates: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadCompleteParams {
    pub hash: String,
    pub server_url: String,
    #[serde(default)]
    pub server_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCreateParams {
    #[serde(default)]
    pub id: Option<i64>,
    pub child_node_ids: Vec<i64>,
    pub pos: [f64; 2],
    pub size: [f64; 2],
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembershipParams {
    pub group_id: i64,
    pub node_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMoveParams {
    pub group_id: i64,
    pub new_pos: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResizeParams {
    pub group_id: i64,
    pub new_size: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupToggleCollapsedParams {
    pub group_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdateStyleParams {
    pub group_id: i64,
    pub style: Value,
}

/// The closed operation catalog (§4.1). Tagged by `type` using the wire's
/// `snake_case` event names, with `params` nested beneath a `params` key
/// matching the protocol's `execute_operation{id, type, params, undoData}`
/// envelope (the envelope itself lives in `canvas-collab`; this enum models
/// the inner `{type, params}` pair only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Operation {
    NodeCreate(NodeCreateParams),
    NodeMove(NodeMoveParams),
    NodeDelete(NodeDeleteParams),
    NodeResize(NodeResizeParams),
    NodeRotate(NodeRotateParams),
    NodePropertyUpdate(NodePropertyUpdateParams),
    NodeBatchPropertyUpdate(NodeBatchPropertyUpdateParams),
    NodeReset(NodeResetParams),
    VideoToggle(VideoToggleParams),
    NodeDuplicate(NodeDuplicateParams),
    NodePaste(NodePasteParams),
    NodeAlign(NodeAlignParams),
    NodeLayerOrder(NodeLayerOrderParams),
    ImageUploadComplete(ImageUploadCompleteParams),
    GroupCreate(GroupCreateParams),
    GroupAddNode(GroupMembershipParams),
    GroupRemoveNode(GroupMembershipParams),
    GroupMove(GroupMoveParams),
    GroupResize(GroupResizeParams),
    GroupToggleCollapsed(GroupToggleCollapsedParams),
    GroupUpdateStyle(GroupUpdateStyleParams),
}

impl Operation {
    /// The wire name of this operation's kind, used for `op_type` in the
    /// persisted operations row.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::NodeCreate(_) => "node_create",
            Operation::NodeMove(_) => "node_move",
            Operation::NodeDelete(_) => "node_delete",
            Operation::NodeResize(_) => "node_resize",
            Operation::NodeRotate(_) => "node_rotate",
            Operation::NodePropertyUpdate(_) => "node_property_update",
            Operation::NodeBatchPropertyUpdate(_) => "node_batch_property_update",
            Operation::NodeReset(_) => "node_reset",
            Operation::VideoToggle(_) => "video_toggle",
            Operation::NodeDuplicate(_) => "node_duplicate",
            Operation::NodePaste(_) => "node_paste",
            Operation::NodeAlign(_) => "node_align",
            Operation::NodeLayerOrder(_) => "node_layer_order",
            Operation::ImageUploadComplete(_) => "image_upload_complete",
            Operation::GroupCreate(_) => "group_create",
            Operation::GroupAddNode(_) => "group_add_node",
            Operation::GroupRemoveNode(_) => "group_remove_node",
            Operation::GroupMove(_) => "group_move",
            Operation::GroupResize(_) => "group_resize",
            Operation::GroupToggleCollapsed(_) => "group_toggle_collapsed",
            Operation::GroupUpdateStyle(_) => "group_update_style",
        }
    }
}
