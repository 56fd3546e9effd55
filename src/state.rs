//! Shared application state threaded through every handler via axum's
//! `State` extractor.

use std::sync::Arc;

use axum::extract::FromRef;

use canvas_collab::CollaborationManager;
use canvas_media::{MediaConfig, TranscodeQueue};
use canvas_store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub manager: Arc<CollaborationManager>,
    pub transcode_queue: Arc<TranscodeQueue>,
    pub media_config: MediaConfig,
    pub cors_origins: Vec<String>,
}

impl FromRef<AppState> for Arc<CollaborationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.manager.clone()
    }
}
