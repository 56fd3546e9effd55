//! `/health`: a simple liveness probe for load balancers.

use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub features: HealthFeatures,
}

#[derive(Debug, Serialize)]
pub struct HealthFeatures {
    pub collaboration: bool,
    pub media_pipeline: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        features: HealthFeatures {
            collaboration: true,
            media_pipeline: true,
        },
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
