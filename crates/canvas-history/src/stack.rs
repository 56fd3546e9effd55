//! Per-`(user, canvas)` undo/redo stacks and their reconstruction from the
//! persisted operations log (spec §4.3).

use canvas_store::{OperationRecord, OperationState};

/// One undoable unit: either a single operation or a transaction bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEntry {
    Single { operation_id: String },
    Transaction {
        transaction_id: String,
        operation_ids: Vec<String>,
    },
}

impl StackEntry {
    pub fn operation_ids(&self) -> Vec<String> {
        match self {
            StackEntry::Single { operation_id } => vec![operation_id.clone()],
            StackEntry::Transaction { operation_ids, .. } => operation_ids.clone(),
        }
    }
}

/// The undo/redo stacks for one `(user, canvas)` pair.
#[derive(Debug, Clone, Default)]
pub struct UndoRedoStacks {
    pub undo: Vec<StackEntry>,
    pub redo: Vec<StackEntry>,
}

impl UndoRedoStacks {
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

/// Group operation rows (already in `sequence_number` order) into stack
/// entries, collapsing consecutive rows sharing a `transaction_id` into one
/// `Transaction` entry. Rows still `applied` land on `undo`; rows `undone`
/// land on `redo`, both in the order they appear in `rows`.
///
/// This is an approximation where undo/redo ordering beyond persisted state
/// is not itself persisted (spec §4.3, "Persistence of stacks"): it assumes
/// rows were undone/redone in roughly the order they were recorded, which
/// holds for the common case of sequential undo/redo without interleaved
/// edits from other users.
pub fn reconstruct(rows: &[OperationRecord]) -> UndoRedoStacks {
    let mut stacks = UndoRedoStacks::default();
    let mut i = 0;
    while i < rows.len() {
        let row = &rows[i];
        let entry = match &row.transaction_id {
            Some(tx_id) => {
                let mut ids = vec![row.id.clone()];
                let mut j = i + 1;
                while j < rows.len() && rows[j].transaction_id.as_deref() == Some(tx_id.as_str()) {
                    ids.push(rows[j].id.clone());
                    j += 1;
                }
                i = j;
                StackEntry::Transaction {
                    transaction_id: tx_id.clone(),
                    operation_ids: ids,
                }
            }
            None => {
                i += 1;
                StackEntry::Single {
                    operation_id: row.id.clone(),
                }
            }
        };

        let ids = entry.operation_ids();
        let states: Vec<OperationState> = ids
            .iter()
            .filter_map(|id| rows.iter().find(|r| &r.id == id).map(|r| r.state))
            .collect();
        if states.iter().all(|s| *s == OperationState::Undone) {
            stacks.redo.push(entry);
        } else {
            stacks.undo.push(entry);
        }
    }
    stacks
}
