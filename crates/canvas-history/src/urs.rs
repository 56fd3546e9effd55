//! Undo/Redo Sync (URS): orchestrates undo/redo against a locked
//! `CanvasState`, and the combined execute+record path used for ordinary
//! edits (spec §4.3, "data flow").

use std::sync::Arc;

use serde_json::Value;

use canvas_core::{CanvasStateManager, ChangeSet, Operation, Outcome};

use crate::error::Result;
use crate::history::OperationHistory;
use crate::inverse::apply_inverse;

/// Result of a successful undo or redo.
#[derive(Debug, Clone)]
pub struct UndoRedoOutcome {
    pub state_version: i64,
    pub changes: ChangeSet,
    pub conflicts: Vec<String>,
    pub operation_ids: Vec<String>,
}

pub struct UndoRedoSync {
    csm: Arc<CanvasStateManager>,
    history: Arc<OperationHistory>,
}

fn row_to_operation(row: &canvas_store::OperationRecord) -> Result<Operation> {
    let params: Value = serde_json::from_str(&row.params)?;
    let envelope = serde_json::json!({ "type": row.op_type, "params": params });
    Ok(serde_json::from_value(envelope)?)
}

impl UndoRedoSync {
    pub fn new(csm: Arc<CanvasStateManager>, history: Arc<OperationHistory>) -> Self {
        Self { csm, history }
    }

    pub fn history(&self) -> &Arc<OperationHistory> {
        &self.history
    }

    pub fn csm(&self) -> &Arc<CanvasStateManager> {
        &self.csm
    }

    /// Validate+apply+persist an operation, then record it in history. The
    /// combined entry point the collaboration manager calls for every
    /// ordinary (non-undo) edit.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_and_record(
        &self,
        canvas_id: i64,
        user_id: i64,
        op: &Operation,
        undo_data: Option<&Value>,
        transaction_id: Option<&str>,
    ) -> Result<Outcome> {
        let outcome = self.csm.execute_operation(canvas_id, op).await?;
        let sequence_number = self.history.store().next_sequence_number(canvas_id).await?;
        let params = serde_json::to_value(op)
            .ok()
            .and_then(|v| v.get("params").cloned())
            .unwrap_or(Value::Null);
        self.history
            .record_operation(
                canvas_id,
                user_id,
                op.kind(),
                &params,
                undo_data,
                sequence_number,
                transaction_id,
            )
            .await?;
        Ok(outcome)
    }

    /// URS.handleUndo (spec §4.3): peek the top of the undo stack, apply its
    /// inverse(s) in reverse sequence order, bump the version once, flip the
    /// rows to `undone`, and move the entry to the redo stack. Returns
    /// `Ok(None)` when there is nothing to undo.
    pub async fn handle_undo(
        &self,
        canvas_id: i64,
        user_id: i64,
    ) -> Result<Option<UndoRedoOutcome>> {
        let Some((entry, rows)) = self.history.pop_for_undo(user_id, canvas_id).await? else {
            return Ok(None);
        };
        let conflicts = self.history.conflicts_for(canvas_id, &rows).await?;

        let cell = self.csm.lock_canvas(canvas_id).await?;
        let mut changes = ChangeSet::default();
        let mut state = cell.lock().await;
        for row in rows.iter().rev() {
            changes.merge(apply_inverse(&mut state, row));
        }
        let version = self.csm.persist_bumped(canvas_id, &mut state).await?;
        drop(state);
        let op_ids = entry.operation_ids();
        self.history.mark_undone(&op_ids, user_id).await?;
        Ok(Some(UndoRedoOutcome {
            state_version: version,
            changes,
            conflicts,
            operation_ids: op_ids,
        }))
    }

    /// URS redo: peek the top of the redo stack, re-apply its operations in
    /// their original order via the ordinary appliers, bump the version
    /// once, flip rows back to `applied`, and move the entry to the undo
    /// stack. Returns `Ok(None)` when there is nothing to redo.
    pub async fn handle_redo(
        &self,
        canvas_id: i64,
        user_id: i64,
    ) -> Result<Option<UndoRedoOutcome>> {
        let Some((entry, rows)) = self.history.pop_for_redo(user_id, canvas_id).await? else {
            return Ok(None);
        };

        let cell = self.csm.lock_canvas(canvas_id).await?;
        let mut changes = ChangeSet::default();
        let mut state = cell.lock().await;
        for row in &rows {
            let op = row_to_operation(row)?;
            changes.merge(canvas_core::apply(&mut state, &op, self.csm.id_minter()));
        }
        let version = self.csm.persist_bumped(canvas_id, &mut state).await?;
        drop(state);
        let op_ids = entry.operation_ids();
        self.history.mark_redone(&op_ids, user_id).await?;
        Ok(Some(UndoRedoOutcome {
            state_version: version,
            changes,
            conflicts: Vec::new(),
            operation_ids: op_ids,
        }))
    }
}
