//! Bridges the media pipeline's transcode queue to the collaboration wire
//! protocol, without `canvas-media` depending on `canvas-collab` (the
//! `TranscodeObserver` trait lives on the media side; this crate supplies
//! the only implementation).

use std::sync::Arc;

use canvas_media::{TranscodeObserver, TranscodeResult};
use canvas_store::Store;
use tracing::warn;

use crate::protocol::ServerEvent;
use crate::session::SessionRegistry;

/// Resolves a transcoding job's filename back to the canvas that owns it
/// and broadcasts progress to that room only.
pub struct RoomTranscodeObserver {
    store: Store,
    sessions: Arc<SessionRegistry>,
}

impl RoomTranscodeObserver {
    pub fn new(store: Store, sessions: Arc<SessionRegistry>) -> Self {
        Self { store, sessions }
    }

    async fn canvas_for(&self, filename: &str) -> Option<i64> {
        match self.store.get_file_by_filename(filename).await {
            Ok(Some(file)) => file.canvas_id,
            Ok(None) => None,
            Err(e) => {
                warn!(filename, error = %e, "failed to resolve canvas for transcode event");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl TranscodeObserver for RoomTranscodeObserver {
    async fn on_queued(&self, _filename: &str, _position: usize) {
        // Queue position is operational detail, not part of the wire
        // protocol; nothing to broadcast here.
    }

    async fn on_start(&self, filename: &str) {
        let Some(canvas_id) = self.canvas_for(filename).await else {
            return;
        };
        self.sessions
            .broadcast_room(
                canvas_id,
                ServerEvent::VideoProcessingStart {
                    filename: filename.to_string(),
                },
            )
            .await;
    }

    async fn on_progress(&self, filename: &str, format: &str, percent: f64) {
        let Some(canvas_id) = self.canvas_for(filename).await else {
            return;
        };
        self.sessions
            .broadcast_room(
                canvas_id,
                ServerEvent::VideoProcessingProgress {
                    filename: filename.to_string(),
                    format: format.to_string(),
                    percent,
                },
            )
            .await;
    }

    async fn on_complete(&self, result: TranscodeResult) {
        let Some(canvas_id) = self.canvas_for(&result.filename).await else {
            return;
        };
        self.sessions
            .broadcast_room(
                canvas_id,
                ServerEvent::VideoProcessingComplete {
                    filename: result.filename,
                    success: result.success,
                    formats: result.formats,
                    error: result.error,
                },
            )
            .await;
    }
}
