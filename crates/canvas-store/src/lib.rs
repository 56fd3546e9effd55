//! Persistence facade for the canvas server.
//!
//! Every other crate in this workspace reaches SQLite through [`Store`].
//! Row types live in [`models`]; nothing above this crate constructs a
//! `sqlx::Row` directly.

mod error;
mod models;
mod store;

pub use error::{Error, Result};
pub use models::{
    Canvas, CanvasCollaborator, CanvasNavigationState, CanvasVersion, FileRecord,
    OperationRecord, OperationState, ProcessingStatus, SessionRecord, TransactionRecord,
    TransactionState, User, UserViewportState,
};
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = Store::new(pool);
        store.init().await.expect("schema init");
        store
    }

    #[tokio::test]
    async fn create_and_fetch_user() {
        let store = test_store().await;
        let user = store
            .create_user("ada", "Ada Lovelace", "#ff7a45")
            .await
            .expect("create user");
        assert_eq!(user.username, "ada");

        let fetched = store
            .get_user_by_username("ada")
            .await
            .expect("query")
            .expect("present");
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.display_name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let store = test_store().await;
        store
            .create_user("ada", "Ada", "#ff7a45")
            .await
            .expect("first insert");
        let second = store.create_user("ada", "Ada Again", "#000000").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn canvas_lifecycle() {
        let store = test_store().await;
        let user = store.create_user("ada", "Ada", "#ff7a45").await.unwrap();
        let canvas = store
            .create_canvas("Board", None, user.id, r#"{"nodes":{},"version":0}"#)
            .await
            .unwrap();

        assert_eq!(store.list_canvases().await.unwrap().len(), 1);

        store
            .update_canvas_data(canvas.id, r#"{"nodes":{"1":{}},"version":1}"#)
            .await
            .unwrap();

        let reloaded = store.get_canvas(canvas.id).await.unwrap().unwrap();
        assert!(reloaded.canvas_data.contains("\"version\":1"));

        assert!(store.delete_canvas(canvas.id).await.unwrap());
        assert!(store.get_canvas(canvas.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn operation_sequence_numbers_increment_per_canvas() {
        let store = test_store().await;
        let user = store.create_user("ada", "Ada", "#ff7a45").await.unwrap();
        let canvas = store
            .create_canvas("Board", None, user.id, "{}")
            .await
            .unwrap();

        assert_eq!(store.next_sequence_number(canvas.id).await.unwrap(), 1);

        let op = OperationRecord {
            id: "op-1".into(),
            canvas_id: canvas.id,
            user_id: user.id,
            op_type: "node_create".into(),
            params: "{}".into(),
            undo_data: Some("{}".into()),
            transaction_id: None,
            sequence_number: 1,
            state: OperationState::Applied,
            timestamp: chrono::Utc::now(),
            undone_at: None,
            undone_by: None,
            redone_at: None,
            redone_by: None,
        };
        store.insert_operation(&op).await.unwrap();
        assert_eq!(store.next_sequence_number(canvas.id).await.unwrap(), 2);

        let ops = store
            .list_operations_by_user_canvas(user.id, canvas.id)
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].state, OperationState::Applied);

        store.mark_operation_undone(&op.id, user.id).await.unwrap();
        let ops = store
            .list_operations_by_user_canvas(user.id, canvas.id)
            .await
            .unwrap();
        assert_eq!(ops[0].state, OperationState::Undone);
    }

    #[tokio::test]
    async fn transaction_round_trip() {
        let store = test_store().await;
        let user = store.create_user("ada", "Ada", "#ff7a45").await.unwrap();
        let canvas = store.create_canvas("Board", None, user.id, "{}").await.unwrap();

        assert!(store
            .get_active_transaction(user.id, canvas.id)
            .await
            .unwrap()
            .is_none());

        let tx = TransactionRecord {
            id: "tx-1".into(),
            user_id: user.id,
            canvas_id: canvas.id,
            source: "drag".into(),
            started_at: chrono::Utc::now(),
            state: TransactionState::Active,
        };
        store.begin_transaction(&tx).await.unwrap();

        let active = store
            .get_active_transaction(user.id, canvas.id)
            .await
            .unwrap()
            .expect("active transaction");
        assert_eq!(active.id, "tx-1");

        store.commit_transaction("tx-1").await.unwrap();
        assert!(store
            .get_active_transaction(user.id, canvas.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn file_hash_dedup_lookup() {
        let store = test_store().await;
        let file = FileRecord {
            filename: "abc123.png".into(),
            original_name: "photo.png".into(),
            mime_type: "image/png".into(),
            size: 1024,
            hash: "deadbeef".into(),
            user_id: None,
            canvas_id: None,
            processed_formats: None,
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            created_at: chrono::Utc::now(),
        };
        store.insert_file(&file).await.unwrap();

        let found = store.get_file_by_hash("deadbeef").await.unwrap().unwrap();
        assert_eq!(found.filename, "abc123.png");

        store
            .update_processing_status("abc123.png", ProcessingStatus::Completed, None)
            .await
            .unwrap();
        let found = store.get_file_by_filename("abc123.png").await.unwrap().unwrap();
        assert_eq!(found.processing_status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn wipe_all_clears_tables() {
        let store = test_store().await;
        let user = store.create_user("ada", "Ada", "#ff7a45").await.unwrap();
        store.create_canvas("Board", None, user.id, "{}").await.unwrap();

        store.wipe_all(true).await.unwrap();

        assert!(store.list_canvases().await.unwrap().is_empty());
        assert!(store.get_user_by_username("ada").await.unwrap().is_none());
    }
}
