//! Operation History and Undo/Redo Sync (spec §4.3): per-user undo/redo
//! stacks reconstructed from the operations log, conflict detection, and
//! inverse application against a resident `CanvasState`.

mod error;
mod history;
mod inverse;
mod stack;
mod touched;
mod urs;

pub use error::{Error, Result};
pub use history::{OperationHistory, UndoState};
pub use inverse::apply_inverse;
pub use stack::{reconstruct, StackEntry, UndoRedoStacks};
pub use touched::touched_node_ids;
pub use urs::{UndoRedoOutcome, UndoRedoSync};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use canvas_core::{CanvasStateManager, NodeCreateParams, NodeMoveParams, Operation};
    use canvas_store::Store;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn harness() -> (UndoRedoSync, i64, i64) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("pool");
        let store = Store::new(pool);
        store.init().await.expect("schema");
        let user = store.create_user("ada", "Ada", "#ff0000").await.unwrap();
        let canvas = store
            .create_canvas("Board", None, user.id, r#"{"nodes":[],"version":0}"#)
            .await
            .unwrap();

        let csm = Arc::new(CanvasStateManager::new(store.clone()));
        let history = Arc::new(OperationHistory::new(store));
        (UndoRedoSync::new(csm, history), user.id, canvas.id)
    }

    #[tokio::test]
    async fn execute_then_undo_restores_prior_state() {
        let (sync, user_id, canvas_id) = harness().await;

        let create = Operation::NodeCreate(NodeCreateParams {
            id: Some(1),
            node_type: "text".into(),
            pos: [0.0, 0.0],
            size: None,
            properties: None,
            rotation: None,
            flags: None,
            title: None,
            aspect_ratio: None,
            image_data: None,
            video_data: None,
        });
        let undo_data = json!({ "nodeId": 1 });
        sync.execute_and_record(canvas_id, user_id, &create, Some(&undo_data), None)
            .await
            .expect("create");

        let mv = Operation::NodeMove(NodeMoveParams {
            node_id: Some(1),
            position: Some([40.0, 40.0]),
            node_ids: None,
            positions: None,
        });
        let undo_data = json!({ "previousPositions": { "1": [0.0, 0.0] } });
        let outcome = sync
            .execute_and_record(canvas_id, user_id, &mv, Some(&undo_data), None)
            .await
            .expect("move");
        assert_eq!(outcome.state_version, 2);

        let undo = sync
            .handle_undo(canvas_id, user_id)
            .await
            .expect("undo")
            .expect("something to undo");
        assert_eq!(undo.state_version, 3);
        assert_eq!(undo.changes.updated[0].pos, [0.0, 0.0]);

        let state = sync.history().get_user_undo_state(user_id, canvas_id).await.unwrap();
        assert!(state.can_redo);
        assert_eq!(state.undo_count, 1);

        let redo = sync
            .handle_redo(canvas_id, user_id)
            .await
            .expect("redo")
            .expect("something to redo");
        assert_eq!(redo.state_version, 4);
        assert_eq!(redo.changes.updated[0].pos, [40.0, 40.0]);
    }

    #[tokio::test]
    async fn undo_with_nothing_recorded_returns_none() {
        let (sync, user_id, canvas_id) = harness().await;
        let result = sync.handle_undo(canvas_id, user_id).await.unwrap();
        assert!(result.is_none());
    }
}
