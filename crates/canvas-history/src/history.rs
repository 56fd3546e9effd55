//! Operation History (OH): the append-only operations log plus the
//! per-`(user, canvas)` undo/redo stacks derived from it (spec §4.3).

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use canvas_store::{OperationRecord, OperationState, Store};

use crate::error::Result;
use crate::stack::{reconstruct, StackEntry, UndoRedoStacks};
use crate::touched::touched_node_ids;

/// Snapshot returned by `getUserUndoState`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoState {
    pub can_undo: bool,
    pub undo_count: usize,
    pub can_redo: bool,
    pub redo_count: usize,
    pub next_undo: Option<String>,
    pub next_redo: Option<String>,
}

pub struct OperationHistory {
    store: Store,
    stacks: RwLock<HashMap<(i64, i64), UndoRedoStacks>>,
}

impl OperationHistory {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            stacks: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The reconstructed (and cached) stacks for a `(user, canvas)` pair.
    pub async fn stacks_for(&self, user_id: i64, canvas_id: i64) -> Result<UndoRedoStacks> {
        if let Some(stacks) = self.stacks.read().await.get(&(user_id, canvas_id)) {
            return Ok(stacks.clone());
        }
        let rows = self
            .store
            .list_operations_by_user_canvas(user_id, canvas_id)
            .await?;
        let stacks = reconstruct(&rows);
        self.stacks
            .write()
            .await
            .insert((user_id, canvas_id), stacks.clone());
        Ok(stacks)
    }

    /// Record a freshly-applied operation: persist the row, push a stack
    /// entry, and clear the redo stack (a fresh edit invalidates any pending
    /// redo per spec §4.3).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_operation(
        &self,
        canvas_id: i64,
        user_id: i64,
        op_type: &str,
        params: &Value,
        undo_data: Option<&Value>,
        sequence_number: i64,
        transaction_id: Option<&str>,
    ) -> Result<OperationRecord> {
        let record = OperationRecord {
            id: Uuid::new_v4().to_string(),
            canvas_id,
            user_id,
            op_type: op_type.to_string(),
            params: serde_json::to_string(params)?,
            undo_data: undo_data.map(serde_json::to_string).transpose()?,
            transaction_id: transaction_id.map(str::to_string),
            sequence_number,
            state: OperationState::Applied,
            timestamp: Utc::now(),
            undone_at: None,
            undone_by: None,
            redone_at: None,
            redone_by: None,
        };
        self.store.insert_operation(&record).await?;

        let mut stacks = self.stacks_for(user_id, canvas_id).await?;
        match transaction_id {
            Some(tx_id) => match stacks.undo.last_mut() {
                Some(StackEntry::Transaction {
                    transaction_id: top_tx,
                    operation_ids,
                }) if top_tx == tx_id => {
                    operation_ids.push(record.id.clone());
                }
                _ => stacks.undo.push(StackEntry::Transaction {
                    transaction_id: tx_id.to_string(),
                    operation_ids: vec![record.id.clone()],
                }),
            },
            None => stacks.undo.push(StackEntry::Single {
                operation_id: record.id.clone(),
            }),
        }
        stacks.redo.clear();
        self.stacks
            .write()
            .await
            .insert((user_id, canvas_id), stacks);

        Ok(record)
    }

    /// Pop the top of the undo stack and move it to the redo stack,
    /// returning the entry (and the operation rows it names, oldest first).
    pub async fn pop_for_undo(
        &self,
        user_id: i64,
        canvas_id: i64,
    ) -> Result<Option<(StackEntry, Vec<OperationRecord>)>> {
        let mut stacks = self.stacks_for(user_id, canvas_id).await?;
        let Some(entry) = stacks.undo.pop() else {
            return Ok(None);
        };
        let mut rows = Vec::new();
        for id in entry.operation_ids() {
            if let Some(row) = self.store.get_operation(&id).await? {
                rows.push(row);
            }
        }
        stacks.redo.push(entry.clone());
        self.stacks
            .write()
            .await
            .insert((user_id, canvas_id), stacks);
        Ok(Some((entry, rows)))
    }

    /// Pop the top of the redo stack and move it back to the undo stack.
    pub async fn pop_for_redo(
        &self,
        user_id: i64,
        canvas_id: i64,
    ) -> Result<Option<(StackEntry, Vec<OperationRecord>)>> {
        let mut stacks = self.stacks_for(user_id, canvas_id).await?;
        let Some(entry) = stacks.redo.pop() else {
            return Ok(None);
        };
        let mut rows = Vec::new();
        for id in entry.operation_ids() {
            if let Some(row) = self.store.get_operation(&id).await? {
                rows.push(row);
            }
        }
        stacks.undo.push(entry.clone());
        self.stacks
            .write()
            .await
            .insert((user_id, canvas_id), stacks);
        Ok(Some((entry, rows)))
    }

    pub async fn mark_undone(&self, op_ids: &[String], undone_by: i64) -> Result<()> {
        for id in op_ids {
            self.store.mark_operation_undone(id, undone_by).await?;
        }
        Ok(())
    }

    pub async fn mark_redone(&self, op_ids: &[String], redone_by: i64) -> Result<()> {
        for id in op_ids {
            self.store.mark_operation_redone(id, redone_by).await?;
        }
        Ok(())
    }

    /// Conflicting op ids: operations with a later sequence number than the
    /// candidate rows that are still `applied` and touch an overlapping
    /// node set. Reported, never blocking.
    pub async fn conflicts_for(&self, canvas_id: i64, candidate_rows: &[OperationRecord]) -> Result<Vec<String>> {
        let Some(min_seq) = candidate_rows.iter().map(|r| r.sequence_number).min() else {
            return Ok(Vec::new());
        };
        let mut candidate_touched = Vec::new();
        for row in candidate_rows {
            if let Ok(params) = serde_json::from_str::<Value>(&row.params) {
                candidate_touched.extend(touched_node_ids(&params));
            }
        }
        let later = self
            .store
            .list_applied_operations_after(canvas_id, min_seq)
            .await?;
        let mut conflicting = Vec::new();
        for row in later {
            if candidate_rows.iter().any(|c| c.id == row.id) {
                continue;
            }
            let Ok(params) = serde_json::from_str::<Value>(&row.params) else {
                continue;
            };
            let touched = touched_node_ids(&params);
            if touched.iter().any(|id| candidate_touched.contains(id)) {
                conflicting.push(row.id);
            }
        }
        Ok(conflicting)
    }

    pub async fn get_user_undo_state(&self, user_id: i64, canvas_id: i64) -> Result<UndoState> {
        let stacks = self.stacks_for(user_id, canvas_id).await?;
        Ok(UndoState {
            can_undo: stacks.can_undo(),
            undo_count: stacks.undo.len(),
            can_redo: stacks.can_redo(),
            redo_count: stacks.redo.len(),
            next_undo: stacks.undo.last().map(|e| e.operation_ids().join(",")),
            next_redo: stacks.redo.last().map(|e| e.operation_ids().join(",")),
        })
    }

    pub async fn get_undo_history(
        &self,
        canvas_id: i64,
        user_id: Option<i64>,
        limit: i64,
        show_all_users: bool,
    ) -> Result<Vec<OperationRecord>> {
        let filter = if show_all_users { None } else { user_id };
        Ok(self
            .store
            .list_operations_detailed(canvas_id, filter, limit)
            .await?)
    }

    /// Clear both stacks and delete every operation row for a canvas
    /// (`clear_undo_history`).
    pub async fn clear_undo_history(&self, canvas_id: i64) -> Result<()> {
        self.store.delete_operations_for_canvas(canvas_id).await?;
        self.stacks.write().await.retain(|(_, c), _| *c != canvas_id);
        Ok(())
    }
}
