//! The Canvas State Manager: the scene/operation model and the single
//! authority for applying operations to a canvas's in-memory state
//! (spec §4.1).

mod apply;
mod canvas;
mod changes;
mod csm;
mod error;
mod id;
mod node;
mod operation;
mod validate;

pub use canvas::CanvasState;
pub use changes::ChangeSet;
pub use csm::{CanvasStateManager, Outcome};
pub use error::{Error, Result};
pub use id::IdMinter;
pub use node::{apply_property_update, Node, DIRECT_ATTRIBUTES};
pub use operation::{
    AlignAxis, GroupCreateParams, GroupMembershipParams, GroupMoveParams, GroupResizeParams,
    GroupToggleCollapsedParams, GroupUpdateStyleParams, ImageUploadCompleteParams,
    LayerDirection, NodeAlignParams, NodeBatchPropertyUpdateParams, NodeCreateParams,
    NodeDeleteParams, NodeDuplicateParams, NodeLayerOrderParams, NodeMoveParams, NodePasteParams,
    NodePropertyUpdateParams, NodeResetParams, NodeResetValues, NodeResizeParams,
    NodeRotateParams, Operation, PropertyUpdate, VideoToggleParams,
};
pub use validate::validate;

/// Re-exported for crates that apply inverses directly against a locked
/// `CanvasState` (canvas-history).
pub use apply::apply;
