//! Periodic mark-and-sweep cleanup of orphaned media (spec §4.4
//! "Cleanup"): runs every `cleanup_interval_secs`, first 30 min after
//! startup, and is also reachable synchronously via `POST
//! /database/cleanup`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use canvas_store::Store;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::thumbnail::{poster_path, thumbnail_path};

/// Outcome of a cleanup pass, returned verbatim by `/database/cleanup`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub referenced: usize,
    pub deleted: usize,
    pub deleted_bytes: u64,
    pub skipped_recent_videos: usize,
    pub dry_run: bool,
    pub refused: bool,
    pub refused_reason: Option<String>,
}

/// How recently an operation must have touched a filename for it to count
/// as referenced, even if the canvas itself no longer does (spec §4.4:
/// "and in the last 30 min of operations").
const OPERATION_WINDOW_MINS: i64 = 30;

/// Videos younger than this are never swept, regardless of reference
/// state, since they may still be mid-upload or awaiting a first open.
const RECENT_VIDEO_GRACE: Duration = Duration::hours(1);

/// Refuse a sweep that would delete more than this fraction of files
/// unless `force` is set (spec §4.4 "dangerous paths").
const MAX_DELETE_FRACTION: f64 = 0.5;

/// Run one mark-and-sweep pass.
///
/// `dry_run` reports counts without touching disk or the database. `force`
/// overrides the >50%-deletion and recent-video safety refusals.
pub async fn run_cleanup(
    store: &Store,
    config: &MediaConfig,
    dry_run: bool,
    force: bool,
    delete_all_thumbnails: bool,
) -> Result<CleanupReport> {
    let files = store.list_all_files().await?;
    let canvases = store.list_canvases().await?;

    let mut referenced = std::collections::HashSet::new();
    for canvas in &canvases {
        for file in &files {
            if canvas.canvas_data.contains(&file.filename) {
                referenced.insert(file.filename.clone());
            }
        }
    }

    let since = Utc::now() - Duration::minutes(OPERATION_WINDOW_MINS);
    for canvas in &canvases {
        if let Ok(ops) = store.list_operations_after(canvas.id, 0).await {
            for op in ops {
                if op.timestamp < since {
                    continue;
                }
                for file in &files {
                    if op.params.contains(&file.filename) {
                        referenced.insert(file.filename.clone());
                    }
                }
            }
        }
    }

    let now = Utc::now();
    let mut candidates = Vec::new();
    let mut skipped_recent_videos = 0usize;
    for file in &files {
        if referenced.contains(&file.filename) {
            continue;
        }
        let is_video = file.mime_type.starts_with("video/");
        let age = now.signed_duration_since(file.created_at);
        if is_video && age < RECENT_VIDEO_GRACE {
            skipped_recent_videos += 1;
            continue;
        }
        candidates.push(file.clone());
    }

    let mut report = CleanupReport {
        scanned: files.len(),
        referenced: referenced.len(),
        deleted: 0,
        deleted_bytes: 0,
        skipped_recent_videos,
        dry_run,
        refused: false,
        refused_reason: None,
    };

    if !files.is_empty() {
        let fraction = candidates.len() as f64 / files.len() as f64;
        if fraction > MAX_DELETE_FRACTION && !force {
            report.refused = true;
            report.refused_reason = Some(format!(
                "would delete {}/{} files ({:.0}%), exceeding the {:.0}% safety threshold; pass force=true to override",
                candidates.len(),
                files.len(),
                fraction * 100.0,
                MAX_DELETE_FRACTION * 100.0
            ));
            return Ok(report);
        }
    }
    if skipped_recent_videos > 0 && !force {
        info!(skipped_recent_videos, "cleanup skipping recently uploaded videos");
    }

    report.deleted = candidates.len();
    report.deleted_bytes = candidates.iter().map(|f| f.size.max(0) as u64).sum();

    if dry_run {
        return Ok(report);
    }

    for file in &candidates {
        if let Err(e) = remove_artifacts(config, &file.filename, delete_all_thumbnails).await {
            warn!(filename = %file.filename, error = %e, "failed to remove media artifacts during cleanup");
        }
        if let Err(e) = store.delete_file(&file.filename).await {
            warn!(filename = %file.filename, error = %e, "failed to delete file row during cleanup");
        }
    }

    info!(deleted = report.deleted, bytes = report.deleted_bytes, "cleanup pass complete");
    Ok(report)
}

async fn remove_artifacts(config: &MediaConfig, filename: &str, delete_all_thumbnails: bool) -> Result<()> {
    let upload_path = config.uploads_dir.join(filename);
    let _ = tokio::fs::remove_file(&upload_path).await;

    let basename = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| filename.to_string());

    for ext in ["webm", "mp4"] {
        let _ = tokio::fs::remove_file(config.transcodes_dir.join(format!("{basename}.{ext}"))).await;
    }
    let _ = tokio::fs::remove_file(poster_path(config, &basename)).await;

    if delete_all_thumbnails {
        for &size in crate::config::THUMBNAIL_SIZES {
            let _ = tokio::fs::remove_file(thumbnail_path(config, size, &basename)).await;
        }
    }
    Ok(())
}

/// Total on-disk + database footprint, for `GET /database/size` (spec §6).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseSizeReport {
    pub file_count: usize,
    pub total_bytes: u64,
}

pub async fn database_size(store: &Store) -> Result<DatabaseSizeReport> {
    let files = store.list_all_files().await?;
    let total_bytes = store.total_file_bytes().await?.max(0) as u64;
    Ok(DatabaseSizeReport {
        file_count: files.len(),
        total_bytes,
    })
}

/// Background scheduler: waits `cleanup_initial_delay_secs`, then runs a
/// non-dry, non-force pass every `cleanup_interval_secs` until cancelled.
pub async fn run_cleanup_scheduler(
    store: Store,
    config: MediaConfig,
    cancel: tokio_util::sync::CancellationToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs(config.cleanup_initial_delay_secs)) => {}
        _ = cancel.cancelled() => return,
    }
    loop {
        match run_cleanup(&store, &config, false, false, false).await {
            Ok(report) if report.refused => {
                warn!(reason = ?report.refused_reason, "scheduled cleanup refused, skipping this cycle");
            }
            Ok(report) => {
                info!(deleted = report.deleted, "scheduled cleanup pass complete");
            }
            Err(e) => warn!(error = %e, "scheduled cleanup pass failed"),
        }
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(config.cleanup_interval_secs)) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

#[allow(unused)]
fn _assert_send<T: Send>() {}
#[allow(unused)]
fn _assert(_d: DateTime<Utc>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_store::{Canvas, FileRecord, ProcessingStatus};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn harness() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn referenced_files_survive_and_orphans_are_reported() {
        let store = harness().await;
        let user = store.create_user("alice", "Alice", "#ff0000").await.unwrap();
        let canvas = store
            .create_canvas("board", None, user.id, r#"{"nodes":{},"version":1}"#)
            .await
            .unwrap();
        let canvas_id = canvas.id;

        let referenced = FileRecord {
            filename: "1000-aaa.png".to_string(),
            original_name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            size: 10,
            hash: "h1".to_string(),
            user_id: Some(user.id),
            canvas_id: Some(canvas_id),
            processed_formats: None,
            processing_status: ProcessingStatus::Completed,
            processing_error: None,
            created_at: Utc::now() - Duration::days(2),
        };
        store.insert_file(&referenced).await.unwrap();

        let orphan = FileRecord {
            filename: "1000-bbb.png".to_string(),
            original_name: "b.png".to_string(),
            mime_type: "image/png".to_string(),
            size: 20,
            hash: "h2".to_string(),
            user_id: Some(user.id),
            canvas_id: Some(canvas_id),
            processed_formats: None,
            processing_status: ProcessingStatus::Completed,
            processing_error: None,
            created_at: Utc::now() - Duration::days(2),
        };
        store.insert_file(&orphan).await.unwrap();

        let data = format!(r#"{{"nodes":{{"1":{{"src":"{}"}}}},"version":1}}"#, referenced.filename);
        store.update_canvas_data(canvas_id, &data).await.unwrap();

        let config = MediaConfig::default();
        let report = run_cleanup(&store, &config, true, false, false).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!report.refused);
    }

    #[tokio::test]
    async fn refuses_when_majority_would_be_deleted() {
        let store = harness().await;
        let user = store.create_user("bob", "Bob", "#00ff00").await.unwrap();
        for i in 0..4 {
            let file = FileRecord {
                filename: format!("1000-{i}.png"),
                original_name: "x.png".to_string(),
                mime_type: "image/png".to_string(),
                size: 5,
                hash: format!("h{i}"),
                user_id: Some(user.id),
                canvas_id: None,
                processed_formats: None,
                processing_status: ProcessingStatus::Completed,
                processing_error: None,
                created_at: Utc::now() - Duration::days(2),
            };
            store.insert_file(&file).await.unwrap();
        }
        let config = MediaConfig::default();
        let report = run_cleanup(&store, &config, true, false, false).await.unwrap();
        assert!(report.refused);
    }

    #[tokio::test]
    async fn recent_videos_are_never_swept() {
        let store = harness().await;
        let user = store.create_user("carol", "Carol", "#0000ff").await.unwrap();
        let file = FileRecord {
            filename: "1000-v.mp4".to_string(),
            original_name: "v.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size: 5,
            hash: "hv".to_string(),
            user_id: Some(user.id),
            canvas_id: None,
            processed_formats: None,
            processing_status: ProcessingStatus::Completed,
            processing_error: None,
            created_at: Utc::now(),
        };
        store.insert_file(&file).await.unwrap();
        let config = MediaConfig::default();
        let report = run_cleanup(&store, &config, true, false, false).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.skipped_recent_videos, 1);
    }

    fn _unused(_: Canvas) {}
}
