//! The HTTP surface's error type: wraps every crate's `Error` in one enum
//! and renders it as `{success, error, code}` JSON with an appropriate
//! status, the same shape the collaboration gateway uses on the socket.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] canvas_store::Error),

    #[error(transparent)]
    Core(#[from] canvas_core::Error),

    #[error(transparent)]
    Media(#[from] canvas_media::Error),

    #[error(transparent)]
    Collab(#[from] canvas_collab::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Store(canvas_store::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Store(canvas_store::Error::Refused(_)) => StatusCode::CONFLICT,
            AppError::Core(canvas_core::Error::CanvasNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Core(canvas_core::Error::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Media(canvas_media::Error::Rejected(_)) => StatusCode::BAD_REQUEST,
            AppError::Media(canvas_media::Error::Refused(_)) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Store(e) => e.code(),
            AppError::Core(e) => e.code(),
            AppError::Media(e) => e.code(),
            AppError::Collab(e) => e.code(),
            AppError::Io(_) => "IO_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
