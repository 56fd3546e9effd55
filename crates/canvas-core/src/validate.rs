//! Structural validation.
//!
//! Validation is existence-tolerant: operations that reference node ids are
//! never rejected for referencing ids that don't exist (that's handled,
//! silently, at apply time). What IS enforced strictly here is shape:
//! matching array lengths, non-empty id lists, required sub-fields.

use crate::error::{Error, Result};
use crate::operation::Operation;

fn non_empty(ids: &[i64], label: &str) -> Result<()> {
    if ids.is_empty() {
        return Err(Error::Validation(format!("{label} must not be empty")));
    }
    Ok(())
}

fn same_length<A, B>(a: &[A], b: &[B], label: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::Validation(format!(
            "{label}: mismatched array lengths ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// Validate an operation's shape. Does not touch canvas state.
pub fn validate(op: &Operation) -> Result<()> {
    match op {
        Operation::NodeCreate(p) => {
            if p.node_type.trim().is_empty() {
                return Err(Error::Validation("node_create requires a type".into()));
            }
            Ok(())
        }
        Operation::NodeMove(p) => {
            let single = p.node_id.is_some() && p.position.is_some();
            let batch = p.node_ids.is_some() && p.positions.is_some();
            if !single && !batch {
                return Err(Error::Validation(
                    "node_move requires either (nodeId, position) or (nodeIds, positions)".into(),
                ));
            }
            if let (Some(ids), Some(positions)) = (&p.node_ids, &p.positions) {
                non_empty(ids, "node_ids")?;
                same_length(ids, positions, "node_move")?;
            }
            Ok(())
        }
        Operation::NodeDelete(p) => non_empty(&p.node_ids, "node_ids"),
        Operation::NodeResize(p) => {
            non_empty(&p.node_ids, "node_ids")?;
            same_length(&p.node_ids, &p.sizes, "node_resize sizes")?;
            if let Some(positions) = &p.positions {
                same_length(&p.node_ids, positions, "node_resize positions")?;
            }
            Ok(())
        }
        Operation::NodeRotate(p) => {
            let single = p.node_id.is_some() && p.angle.is_some();
            let batch = p.node_ids.is_some() && p.angles.is_some();
            if !single && !batch {
                return Err(Error::Validation(
                    "node_rotate requires either (nodeId, angle) or (nodeIds, angles)".into(),
                ));
            }
            if let (Some(ids), Some(angles)) = (&p.node_ids, &p.angles) {
                non_empty(ids, "node_ids")?;
                same_length(ids, angles, "node_rotate angles")?;
                if let Some(positions) = &p.positions {
                    same_length(ids, positions, "node_rotate positions")?;
                }
            }
            Ok(())
        }
        Operation::NodePropertyUpdate(p) => {
            if p.property.trim().is_empty() {
                return Err(Error::Validation("property name must not be empty".into()));
            }
            Ok(())
        }
        Operation::NodeBatchPropertyUpdate(p) => non_empty(
            &p.updates.iter().map(|u| u.node_id).collect::<Vec<_>>(),
            "updates",
        ),
        Operation::NodeReset(p) => {
            non_empty(&p.node_ids, "node_ids")?;
            if p.reset_aspect_ratio {
                let has_target = p
                    .values
                    .as_ref()
                    .and_then(|v| v.target_aspect)
                    .is_some();
                if !has_target {
                    return Err(Error::Validation(
                        "node_reset with resetAspectRatio requires values.targetAspect".into(),
                    ));
                }
            }
            Ok(())
        }
        Operation::VideoToggle(_) => Ok(()),
        Operation::NodeDuplicate(p) => {
            let has_ids = p.node_ids.as_ref().is_some_and(|ids| !ids.is_empty());
            let has_data = p.node_data.as_ref().is_some_and(|d| !d.is_empty());
            if !has_ids && !has_data {
                return Err(Error::Validation(
                    "node_duplicate requires nodeIds or nodeData".into(),
                ));
            }
            Ok(())
        }
        Operation::NodePaste(p) => {
            if p.node_data.is_empty() {
                return Err(Error::Validation("node_paste requires nodeData".into()));
            }
            Ok(())
        }
        Operation::NodeAlign(p) => {
            non_empty(&p.node_ids, "node_ids")?;
            same_length(&p.node_ids, &p.positions, "node_align")
        }
        Operation::NodeLayerOrder(p) => non_empty(&p.node_ids, "node_ids"),
        Operation::ImageUploadComplete(p) => {
            if p.hash.trim().is_empty() || p.server_url.trim().is_empty() {
                return Err(Error::Validation(
                    "image_upload_complete requires hash and serverUrl".into(),
                ));
            }
            Ok(())
        }
        Operation::GroupCreate(p) => {
            if p.size[0] <= 0.0 || p.size[1] <= 0.0 {
                return Err(Error::Validation("group_create requires a positive size".into()));
            }
            Ok(())
        }
        Operation::GroupAddNode(_)
        | Operation::GroupRemoveNode(_)
        | Operation::GroupMove(_)
        | Operation::GroupResize(_)
        | Operation::GroupToggleCollapsed(_)
        | Operation::GroupUpdateStyle(_) => Ok(()),
    }
}
