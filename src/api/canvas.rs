//! Canvas CRUD and viewport/navigation state: `GET/POST /canvases`,
//! `GET/PUT/DELETE /canvases/:id`, `GET/PUT/PATCH /canvases/:id/state`.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use canvas_core::CanvasState;
use canvas_store::Canvas;

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CanvasResponse {
    id: i64,
    name: String,
    description: Option<String>,
    owner_id: i64,
    #[serde(rename = "lastModified")]
    last_modified: String,
}

impl From<Canvas> for CanvasResponse {
    fn from(canvas: Canvas) -> Self {
        Self {
            id: canvas.id,
            name: canvas.name,
            description: canvas.description,
            owner_id: canvas.owner_id,
            last_modified: canvas.last_modified.to_rfc3339(),
        }
    }
}

async fn list_canvases(State(state): State<AppState>) -> Result<Json<Vec<CanvasResponse>>> {
    let canvases = state.store.list_canvases().await?;
    Ok(Json(canvases.into_iter().map(CanvasResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateCanvasRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    username: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Creates a canvas with an empty scene, resolving (or registering) the
/// owner the same way `join_canvas` does (spec §4.2's user bootstrap).
async fn create_canvas(
    State(state): State<AppState>,
    Json(req): Json<CreateCanvasRequest>,
) -> Result<Json<CanvasResponse>> {
    let owner = match state.store.get_user_by_username(&req.username).await? {
        Some(user) => user,
        None => {
            let count = state.store.count_users().await?;
            let color = canvas_collab::color_for(count);
            state
                .store
                .create_user(&req.username, req.display_name.as_deref().unwrap_or(&req.username), color)
                .await?
        }
    };

    let empty_blob = CanvasState::empty(0).to_blob()?;
    let canvas = state
        .store
        .create_canvas(&req.name, req.description.as_deref(), owner.id, &empty_blob)
        .await?;
    Ok(Json(CanvasResponse::from(canvas)))
}

async fn get_canvas(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<CanvasResponse>> {
    let canvas = state
        .store
        .get_canvas(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("canvas {id}")))?;
    Ok(Json(CanvasResponse::from(canvas)))
}

#[derive(Debug, Deserialize)]
struct UpdateCanvasRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

async fn update_canvas(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCanvasRequest>,
) -> Result<Json<CanvasResponse>> {
    state
        .store
        .update_canvas_meta(id, req.name.as_deref(), req.description.as_deref())
        .await?;
    let canvas = state
        .store
        .get_canvas(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("canvas {id}")))?;
    Ok(Json(CanvasResponse::from(canvas)))
}

async fn delete_canvas(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<serde_json::Value>> {
    let deleted = state.store.delete_canvas(id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("canvas {id}")));
    }
    state.manager.csm().evict(id).await;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Serialize)]
struct NavigationStateResponse {
    scale: f64,
    offset: [f64; 2],
}

async fn get_canvas_state(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<NavigationStateResponse>> {
    let nav = state.store.get_canvas_navigation_state(id).await?;
    Ok(Json(match nav {
        Some(nav) => NavigationStateResponse {
            scale: nav.scale,
            offset: [nav.offset_x, nav.offset_y],
        },
        None => NavigationStateResponse { scale: 1.0, offset: [0.0, 0.0] },
    }))
}

#[derive(Debug, Deserialize)]
struct NavigationStatePayload {
    scale: f64,
    offset: [f64; 2],
    #[serde(default)]
    #[allow(dead_code)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NavigationStateRequest {
    navigation_state: NavigationStatePayload,
}

/// Shared by `PUT` and `PATCH`: both forms carry the same
/// `{navigation_state: {scale, offset, timestamp}}` envelope and fully
/// replace the stored viewport (there being only one field set to merge).
async fn put_canvas_state(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NavigationStateRequest>,
) -> Result<Json<NavigationStateResponse>> {
    let nav = req.navigation_state;
    if !(nav.scale > 0.0 && nav.scale <= 20.0) {
        return Err(AppError::BadRequest("scale must be in (0, 20]".to_string()));
    }
    state
        .store
        .upsert_canvas_navigation_state(id, nav.scale, nav.offset[0], nav.offset[1])
        .await?;
    Ok(Json(NavigationStateResponse { scale: nav.scale, offset: nav.offset }))
}

pub fn canvas_routes() -> Router<AppState> {
    Router::new()
        .route("/canvases", get(list_canvases).post(create_canvas))
        .route(
            "/canvases/:id",
            get(get_canvas).put(update_canvas).delete(delete_canvas),
        )
        .route(
            "/canvases/:id/state",
            get(get_canvas_state).put(put_canvas_state).patch(put_canvas_state),
        )
}
