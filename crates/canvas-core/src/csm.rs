//! The Canvas State Manager: the single authority that loads, mutates, and
//! persists canvas scenes (spec §4.1).
//!
//! One [`CanvasState`] lives in memory per canvas for as long as any code
//! holds a reference to it; callers reach it through `lock_canvas`, which
//! loads from `canvas-store` on first touch and returns a unit-to-canvas
//! `Arc<Mutex<CanvasState>>` afterward. `canvas-history` reuses `lock_canvas`
//! directly to apply undo/redo inverses without duplicating the appliers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use canvas_store::Store;

use crate::apply::apply;
use crate::canvas::CanvasState;
use crate::changes::ChangeSet;
use crate::error::{Error, Result};
use crate::id::IdMinter;
use crate::operation::Operation;
use crate::validate::validate;

/// Outcome of `execute_operation`: the new scene version and the diff a
/// caller broadcasts to connected clients.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub state_version: i64,
    pub changes: ChangeSet,
}

/// Owns the resident scene cache and the id minter shared by every canvas.
pub struct CanvasStateManager {
    store: Store,
    id_minter: IdMinter,
    cache: RwLock<HashMap<i64, Arc<Mutex<CanvasState>>>>,
}

impl CanvasStateManager {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            id_minter: IdMinter::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The canvas's in-memory cell, loading it from persistence on first
    /// touch. Every caller (operation execution, undo/redo) goes through
    /// this so there is exactly one resident `CanvasState` per canvas.
    pub async fn lock_canvas(&self, canvas_id: i64) -> Result<Arc<Mutex<CanvasState>>> {
        if let Some(cell) = self.cache.read().await.get(&canvas_id) {
            return Ok(cell.clone());
        }
        let mut cache = self.cache.write().await;
        if let Some(cell) = cache.get(&canvas_id) {
            return Ok(cell.clone());
        }
        let record = self
            .store
            .get_canvas(canvas_id)
            .await?
            .ok_or(Error::CanvasNotFound(canvas_id))?;
        let state = CanvasState::from_blob(canvas_id, &record.canvas_data, record.last_modified)?;
        let cell = Arc::new(Mutex::new(state));
        cache.insert(canvas_id, cell.clone());
        Ok(cell)
    }

    /// Drop a canvas's cached state, forcing the next `lock_canvas` to
    /// reload from persistence. Used after out-of-band mutation (e.g. an
    /// admin-initiated wipe).
    pub async fn evict(&self, canvas_id: i64) {
        self.cache.write().await.remove(&canvas_id);
    }

    /// Drop every cached canvas. Used after a full database wipe.
    pub async fn evict_all(&self) {
        self.cache.write().await.clear();
    }

    /// Validate, apply, persist, and return the diff for a single operation
    /// (spec §4.1's `executeOperation` contract).
    pub async fn execute_operation(
        &self,
        canvas_id: i64,
        op: &Operation,
    ) -> Result<Outcome> {
        validate(op)?;
        let cell = self.lock_canvas(canvas_id).await?;
        let mut state = cell.lock().await;
        let changes = apply(&mut state, op, &self.id_minter);
        let version = self.persist_bumped(canvas_id, &mut state).await?;
        Ok(Outcome {
            state_version: version,
            changes,
        })
    }

    /// Bump `version`, stamp `last_modified`, and persist the blob for an
    /// already-locked `CanvasState`. Shared by `execute_operation` and by
    /// `canvas-history`'s undo/redo, which mutate the same resident state
    /// directly rather than through an `Operation`.
    pub async fn persist_bumped(&self, canvas_id: i64, state: &mut CanvasState) -> Result<i64> {
        state.version += 1;
        state.last_modified = Utc::now();
        let blob = state.to_blob()?;
        self.store.update_canvas_data(canvas_id, &blob).await?;
        Ok(state.version)
    }

    pub fn id_minter(&self) -> &IdMinter {
        &self.id_minter
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
