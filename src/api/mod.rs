//! HTTP and WebSocket route aggregation.

mod canvas;
mod health;
mod maintenance;
mod upload;
mod websocket;

use axum::Router;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::health_routes())
        .merge(upload::upload_routes())
        .merge(canvas::canvas_routes())
        .merge(maintenance::maintenance_routes())
        .merge(websocket::websocket_routes())
}
