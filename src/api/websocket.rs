//! Wires the collaboration gateway's WebSocket upgrade handler into the
//! HTTP router at `/ws`.

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn websocket_routes() -> Router<AppState> {
    Router::new().route("/ws", get(canvas_collab::ws_upgrade))
}
