//! Upload ingestion and media serving: `POST /api/upload`, `GET
//! /uploads/:filename`, `GET /thumbnails/:size/:filename`, and `POST
//! /api/thumbnails/generate`.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use canvas_media::{
    generate_thumbnails, ingest_upload, original_path, thumbnail_path, choose_video_rendition,
    TranscodeFormat, TranscodeJob, THUMBNAIL_SIZES,
};

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct UploadResponse {
    success: bool,
    url: String,
    hash: String,
    filename: String,
    #[serde(rename = "serverFilename")]
    server_filename: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing: Option<bool>,
}

/// Accepts a multipart upload, writes it to disk, records a `files` row,
/// and — for video — enqueues transcoding.
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse> {
    let mut data: Option<Vec<u8>> = None;
    let mut original_name = String::new();
    let mut mime_type = String::new();
    let mut client_hash: Option<String> = None;
    let mut canvas_id: Option<i64> = None;
    let mut user_id: Option<i64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                original_name = field.file_name().unwrap_or("upload.bin").to_string();
                mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?
                        .to_vec(),
                );
            }
            "hash" => {
                client_hash = field.text().await.ok().filter(|s| !s.is_empty());
            }
            "canvasId" => {
                canvas_id = field.text().await.ok().and_then(|s| s.parse().ok());
            }
            "userId" => {
                user_id = field.text().await.ok().and_then(|s| s.parse().ok());
            }
            _ => {}
        }
    }

    let data = data.ok_or_else(|| AppError::BadRequest("missing `file` field".to_string()))?;

    let outcome = ingest_upload(
        &state.store,
        &state.media_config,
        &data,
        &original_name,
        &mime_type,
        client_hash.as_deref(),
        user_id,
        canvas_id,
    )
    .await?;

    let mut processing = None;
    if outcome.is_video {
        let source_path = state.media_config.uploads_dir.join(&outcome.filename);
        let mut formats = vec![TranscodeFormat::Webm];
        if state.media_config.enable_mp4_output {
            formats.push(TranscodeFormat::Mp4);
        }
        state
            .transcode_queue
            .enqueue(TranscodeJob {
                filename: outcome.filename.clone(),
                source_path,
                formats,
                delete_original: state.media_config.delete_original_after_transcode,
            })
            .await;
        processing = Some(true);
    } else if outcome.is_image {
        let basename = outcome
            .filename
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| outcome.filename.clone());
        let source_path = state.media_config.uploads_dir.join(&outcome.filename);
        if let Err(e) = generate_thumbnails(&state.media_config, &source_path, &basename, THUMBNAIL_SIZES).await {
            tracing::warn!(filename = %outcome.filename, error = %e, "thumbnail generation failed");
        }
    }

    Ok(Json(UploadResponse {
        success: true,
        url: format!("/uploads/{}", outcome.filename),
        hash: outcome.hash,
        filename: outcome.original_name,
        server_filename: outcome.filename,
        size: outcome.size,
        processing,
    }))
}

/// Serves a stored upload, content-negotiating video renditions against
/// `Accept`.
async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let file = state
        .store
        .get_file_by_filename(&filename)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {filename}")))?;

    let choice = if file.mime_type.starts_with("video/") {
        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("*/*");
        choose_video_rendition(&state.media_config, &file, accept)
    } else {
        canvas_media::ServeChoice {
            path: original_path(&state.media_config, &file),
            mime_type: file.mime_type.clone(),
        }
    };

    let bytes = tokio::fs::read(&choice.path).await.map_err(AppError::Io)?;
    Ok((
        [
            (header::CONTENT_TYPE, choice.mime_type),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Serves a thumbnail derivative.
async fn serve_thumbnail(
    State(state): State<AppState>,
    Path((size, filename)): Path<(u32, String)>,
) -> Result<Response> {
    let basename = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or(filename);
    let path = thumbnail_path(&state.media_config, size, &basename);
    let bytes = tokio::fs::read(&path).await.map_err(AppError::Io)?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/webp".to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct GenerateThumbnailsRequest {
    hash: String,
    sizes: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct GenerateThumbnailsResponse {
    urls: std::collections::HashMap<String, String>,
}

async fn generate_thumbnails_endpoint(
    State(state): State<AppState>,
    Json(req): Json<GenerateThumbnailsRequest>,
) -> Result<Json<GenerateThumbnailsResponse>> {
    let file = state
        .store
        .get_file_by_hash(&req.hash)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file with hash {}", req.hash)))?;

    let basename = file
        .filename
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| file.filename.clone());
    let source_path = original_path(&state.media_config, &file);

    let generated = generate_thumbnails(&state.media_config, &source_path, &basename, &req.sizes).await?;

    let urls = generated
        .into_iter()
        .map(|size| (size.to_string(), format!("/thumbnails/{size}/{}.webp", basename)))
        .collect();

    Ok(Json(GenerateThumbnailsResponse { urls }))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/uploads/:filename", get(serve_upload))
        .route("/thumbnails/:size/:filename", get(serve_thumbnail))
        .route("/api/thumbnails/generate", post(generate_thumbnails_endpoint))
}
