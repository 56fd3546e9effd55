//! The scene element envelope.
//!
//! Per the re-architecture guidance, nodes are modeled as one struct with a
//! `node_type` tag and a free-form `properties` bag rather than an enum of
//! per-type variants; specialized attributes (`toneCurve`, group
//! `childNodes`) live in `properties`, not in subclasses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A scene element. `id` is globally unique per canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: i64,
    #[serde(rename = "type")]
    pub node_type: String,
    pub pos: [f64; 2],
    pub size: [f64; 2],
    #[serde(default)]
    pub rotation: f64,
    pub aspect_ratio: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub flags: Map<String, Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tone_curve: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub adjustments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color_balance: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color_adjustments_bypassed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tone_curve_bypassed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color_balance_bypassed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub z_index: Option<f64>,
}

impl Node {
    /// Node type tags used by the media pipeline and video-specific ops.
    pub const MEDIA_IMAGE: &'static str = "media/image";
    pub const MEDIA_VIDEO: &'static str = "media/video";
    pub const GROUP: &'static str = "container/group";

    pub fn is_group(&self) -> bool {
        self.node_type == Self::GROUP
    }

    pub fn is_media_image(&self) -> bool {
        self.node_type == Self::MEDIA_IMAGE
    }

    pub fn is_media_video(&self) -> bool {
        self.node_type == Self::MEDIA_VIDEO
    }

    /// Ordered child ids of a group node (`properties.childNodes`), empty
    /// for non-group nodes or malformed data.
    pub fn child_node_ids(&self) -> Vec<i64> {
        self.properties
            .get("childNodes")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default()
    }

    pub fn set_child_node_ids(&mut self, ids: &[i64]) {
        self.properties.insert(
            "childNodes".to_string(),
            Value::Array(ids.iter().map(|id| Value::from(*id)).collect()),
        );
    }

    /// Drop an inline `data:` URL from `properties.src`, per the
    /// media-property sanitation rule: uploaded content must be referenced
    /// by hash/serverUrl, never embedded.
    pub fn sanitize_inline_src(&mut self) {
        if !(self.is_media_image() || self.is_media_video()) {
            return;
        }
        let is_data_url = matches!(
            self.properties.get("src"),
            Some(Value::String(s)) if s.starts_with("data:")
        );
        if is_data_url {
            self.properties.remove("src");
        }
    }

    /// Shallow-merge a map of property updates into `properties`.
    pub fn merge_properties(&mut self, updates: &Map<String, Value>) {
        for (k, v) in updates {
            self.properties.insert(k.clone(), v.clone());
        }
    }
}

/// Property names that write to a direct struct attribute rather than the
/// `properties` bag, per `node_property_update`'s dispatch rule.
pub const DIRECT_ATTRIBUTES: &[&str] = &[
    "title",
    "rotation",
    "aspectRatio",
    "toneCurve",
    "toneCurveBypassed",
    "colorAdjustmentsBypassed",
    "adjustments",
    "colorBalance",
    "colorBalanceBypassed",
];

/// Apply a single `{property, value}` pair to a node, writing to the direct
/// attribute if `property` is in [`DIRECT_ATTRIBUTES`], otherwise into
/// `properties`.
pub fn apply_property_update(node: &mut Node, property: &str, value: &Value) {
    match property {
        "title" => node.title = value.as_str().unwrap_or_default().to_string(),
        "rotation" => node.rotation = value.as_f64().unwrap_or(node.rotation),
        "aspectRatio" => node.aspect_ratio = value.as_f64().unwrap_or(node.aspect_ratio),
        "toneCurve" => node.tone_curve = Some(value.clone()),
        "toneCurveBypassed" => node.tone_curve_bypassed = value.as_bool(),
        "colorAdjustmentsBypassed" => node.color_adjustments_bypassed = value.as_bool(),
        "adjustments" => node.adjustments = Some(value.clone()),
        "colorBalance" => node.color_balance = Some(value.clone()),
        "colorBalanceBypassed" => node.color_balance_bypassed = value.as_bool(),
        _ => {
            node.properties.insert(property.to_string(), value.clone());
        }
    }
}
