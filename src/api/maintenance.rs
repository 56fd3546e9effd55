//! Database housekeeping: `POST /database/cleanup`, `GET /database/size`,
//! `POST /debug/wipe-database`.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use canvas_media::{database_size, run_cleanup};

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CleanupQuery {
    #[serde(default, rename = "dryRun")]
    dry_run: bool,
    #[serde(default)]
    force: bool,
    #[serde(default, rename = "deleteAllThumbnails")]
    delete_all_thumbnails: bool,
}

async fn cleanup(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<canvas_media::CleanupReport>> {
    let report = run_cleanup(
        &state.store,
        &state.media_config,
        query.dry_run,
        query.force,
        query.delete_all_thumbnails,
    )
    .await?;
    Ok(Json(report))
}

async fn size(State(state): State<AppState>) -> Result<Json<canvas_media::DatabaseSizeReport>> {
    Ok(Json(database_size(&state.store).await?))
}

#[derive(Debug, Deserialize)]
struct WipeRequest {
    confirm: bool,
    #[serde(default, rename = "includeFiles")]
    include_files: bool,
}

/// Drops every row in the database, gated on an explicit `confirm: true` so
/// a stray request can't wipe production data.
async fn wipe_database(
    State(state): State<AppState>,
    Json(req): Json<WipeRequest>,
) -> Result<Json<serde_json::Value>> {
    if !req.confirm {
        return Err(AppError::BadRequest("set confirm: true to wipe the database".to_string()));
    }
    state.store.wipe_all(req.include_files).await?;
    state.manager.csm().evict_all().await;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub fn maintenance_routes() -> Router<AppState> {
    Router::new()
        .route("/database/cleanup", post(cleanup))
        .route("/database/size", get(size))
        .route("/debug/wipe-database", post(wipe_database))
}
