//! The WebSocket connection handler: one `tokio::select!` loop per socket,
//! multiplexing inbound client frames, the socket's outbound event channel,
//! and a ping/heartbeat timer (spec §4.2, "Connection lifecycle (ambient)").

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::manager::CollaborationManager;
use crate::protocol::{ClientEvent, ServerEvent};

/// Hard cap on an inbound frame, matched to `executeOperation`'s payload
/// limit (spec §5). Applied at ingress, before the frame is even parsed.
const MAX_FRAME_BYTES: usize = 100 * 1024;
const PING_INTERVAL_SECS: u64 = 30;
const HEARTBEAT_TIMEOUT_SECS: u64 = 60;

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(manager): State<Arc<CollaborationManager>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, manager))
}

async fn handle_socket(socket: WebSocket, manager: Arc<CollaborationManager>) {
    let socket_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    manager.sessions().register_outbound(&socket_id, tx).await;

    let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
    let mut last_activity = Instant::now();
    let mut transaction_id: Option<String> = None;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        handle_text(&manager, &socket_id, &text, &mut transaction_id).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(socket_id = %socket_id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(HEARTBEAT_TIMEOUT_SECS) {
                    debug!(socket_id = %socket_id, "heartbeat timeout, closing connection");
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    manager.sessions().unregister_outbound(&socket_id).await;
    if let Err(e) = manager.leave_canvas(&socket_id).await {
        warn!(socket_id = %socket_id, error = %e, "error tearing down session on disconnect");
    }
}

async fn handle_text(
    manager: &Arc<CollaborationManager>,
    socket_id: &str,
    text: &str,
    transaction_id: &mut Option<String>,
) {
    if text.len() > MAX_FRAME_BYTES {
        manager
            .sessions()
            .send_to_socket(
                socket_id,
                ServerEvent::OperationRejected {
                    operation_id: None,
                    error: Error::PayloadTooLarge(text.len()).to_string(),
                },
            )
            .await;
        return;
    }

    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            manager
                .sessions()
                .send_to_socket(
                    socket_id,
                    ServerEvent::Error {
                        message: format!("malformed event: {e}"),
                    },
                )
                .await;
            return;
        }
    };

    if let Err(e) = dispatch(manager, socket_id, event, transaction_id).await {
        manager
            .sessions()
            .send_to_socket(socket_id, ServerEvent::Error { message: e.to_string() })
            .await;
    }
}

async fn dispatch(
    manager: &Arc<CollaborationManager>,
    socket_id: &str,
    event: ClientEvent,
    transaction_id: &mut Option<String>,
) -> Result<()> {
    match event {
        ClientEvent::JoinCanvas(payload) => {
            manager
                .join_canvas(
                    socket_id,
                    payload.canvas_id,
                    &payload.username,
                    payload.display_name.as_deref(),
                    payload.tab_id,
                )
                .await
        }
        ClientEvent::LeaveCanvas => manager.leave_canvas(socket_id).await,
        ClientEvent::ExecuteOperation(payload) | ClientEvent::CanvasOperation(payload) => {
            manager
                .execute_operation(socket_id, payload, transaction_id.clone())
                .await
        }
        ClientEvent::RequestFullSync(_) => manager.request_full_sync(socket_id).await,
        ClientEvent::SyncCheck(payload) => manager.sync_check(socket_id, payload.last_sequence).await,
        ClientEvent::UndoOperation => manager.undo_operation(socket_id).await,
        ClientEvent::RedoOperation => manager.redo_operation(socket_id).await,
        ClientEvent::RequestUndoState => manager.request_undo_state(socket_id).await,
        ClientEvent::GetUndoHistory(payload) => {
            manager
                .get_undo_history(socket_id, payload.limit, payload.show_all_users)
                .await
        }
        ClientEvent::ClearUndoHistory(payload) => {
            manager.clear_undo_history(socket_id, payload.canvas_id).await
        }
        ClientEvent::BeginTransaction(payload) => {
            let id = manager.begin_transaction(socket_id, payload.source).await?;
            *transaction_id = Some(id);
            Ok(())
        }
        ClientEvent::CommitTransaction => match transaction_id.take() {
            Some(id) => manager.commit_transaction(socket_id, &id).await,
            None => Err(Error::NoActiveTransaction),
        },
        ClientEvent::AbortTransaction => match transaction_id.take() {
            Some(id) => manager.abort_transaction(socket_id, &id).await,
            None => Err(Error::NoActiveTransaction),
        },
        ClientEvent::Ping(payload) => {
            manager.ping(socket_id, payload.ts).await;
            Ok(())
        }
    }
}
