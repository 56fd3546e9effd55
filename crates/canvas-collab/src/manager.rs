//! The collaboration manager: the single entry point the gateway calls into
//! for every client event (spec §4.2). Owns the process-wide `SessionRegistry`
//! and wires the Canvas State Manager, Operation History, and Undo/Redo Sync
//! together with it.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use canvas_core::Node;
use canvas_history::{OperationHistory, UndoRedoSync};
use canvas_store::{SessionRecord, Store, TransactionRecord, TransactionState};

use crate::error::{Error, Result};
use crate::palette::color_for;
use crate::protocol::{ActiveUser, ExecuteOperationPayload, ServerEvent, UndoHistoryEntry};
use crate::session::{Session, SessionRegistry};

/// Ties the persistence facade, the scene/operation layer, and the
/// session/room bookkeeping together behind one API the gateway drives.
pub struct CollaborationManager {
    store: Store,
    csm: Arc<canvas_core::CanvasStateManager>,
    history: Arc<OperationHistory>,
    urs: Arc<UndoRedoSync>,
    sessions: Arc<SessionRegistry>,
}

impl CollaborationManager {
    pub fn new(store: Store) -> Self {
        let csm = Arc::new(canvas_core::CanvasStateManager::new(store.clone()));
        let history = Arc::new(OperationHistory::new(store.clone()));
        let urs = Arc::new(UndoRedoSync::new(csm.clone(), history.clone()));
        Self {
            store,
            csm,
            history,
            urs,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn csm(&self) -> &Arc<canvas_core::CanvasStateManager> {
        &self.csm
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    async fn active_users(&self, canvas_id: i64) -> Vec<ActiveUser> {
        let mut users = Vec::new();
        for (user_id, tab_count) in self.sessions.distinct_users_in_room(canvas_id).await {
            if let Ok(Some(user)) = self.store.get_user_by_id(user_id).await {
                users.push(ActiveUser {
                    user_id: user.id,
                    username: user.username,
                    display_name: user.display_name,
                    color: user.color,
                    tab_count,
                });
            }
        }
        users
    }

    /// `join_canvas`: look up or register the user, attach the socket to the
    /// canvas's room, and bootstrap it with the current scene (spec §4.2).
    pub async fn join_canvas(
        &self,
        socket_id: &str,
        canvas_id: i64,
        username: &str,
        display_name: Option<&str>,
        tab_id: Option<String>,
    ) -> Result<()> {
        let user = match self.store.get_user_by_username(username).await? {
            Some(user) => user,
            None => {
                let count = self.store.count_users().await?;
                let color = color_for(count);
                self.store
                    .create_user(username, display_name.unwrap_or(username), color)
                    .await?
            }
        };

        let cell = self
            .csm
            .lock_canvas(canvas_id)
            .await
            .map_err(|e| match e {
                canvas_core::Error::CanvasNotFound(id) => Error::UnknownCanvas(id),
                other => other.into(),
            })?;

        let tab_id = tab_id.unwrap_or_else(SessionRegistry::default_tab_id);
        let session = Session {
            socket_id: socket_id.to_string(),
            user_id: user.id,
            canvas_id,
            tab_id: tab_id.clone(),
            joined_at: Utc::now(),
            last_ping: Utc::now(),
        };
        let effect = self.sessions.join(session).await;

        if let Err(e) = self
            .store
            .upsert_session(&SessionRecord {
                socket_id: socket_id.to_string(),
                user_id: user.id,
                canvas_id,
                tab_id: tab_id.clone(),
                joined_at: Utc::now(),
                last_ping: Utc::now(),
            })
            .await
        {
            warn!(error = %e, "failed to persist session row");
        }

        let (nodes, version): (Vec<Node>, i64) = {
            let state = cell.lock().await;
            (state.nodes.values().cloned().collect(), state.version)
        };

        self.sessions
            .send_to_socket(
                socket_id,
                ServerEvent::CanvasJoined {
                    canvas_id,
                    user_id: user.id,
                    color: user.color.clone(),
                    nodes,
                    version,
                },
            )
            .await;
        self.sessions
            .send_to_socket(
                socket_id,
                ServerEvent::ActiveUsers {
                    users: self.active_users(canvas_id).await,
                },
            )
            .await;

        if effect.is_first_session_for_user {
            self.sessions
                .broadcast_room_except_user(
                    canvas_id,
                    user.id,
                    ServerEvent::UserJoined {
                        user: ActiveUser {
                            user_id: user.id,
                            username: user.username.clone(),
                            display_name: user.display_name.clone(),
                            color: user.color.clone(),
                            tab_count: 1,
                        },
                    },
                )
                .await;
        }

        if effect.room_had_existing_sockets {
            if let Some(peer) = self
                .sessions
                .pick_reconciliation_socket(canvas_id, user.id, socket_id)
                .await
            {
                self.sessions
                    .send_to_socket(
                        &peer,
                        ServerEvent::RequestCanvasState {
                            for_socket_id: socket_id.to_string(),
                        },
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// `leave_canvas`: detach the socket and tell the room who left, or only
    /// that a tab closed if the user still has another session open.
    pub async fn leave_canvas(&self, socket_id: &str) -> Result<()> {
        let Some(effect) = self.sessions.leave(socket_id).await else {
            return Ok(());
        };
        if let Err(e) = self.store.remove_session(socket_id).await {
            warn!(error = %e, "failed to remove session row");
        }

        let session = effect.session;
        if effect.was_last_session_for_user {
            self.sessions
                .broadcast_room(session.canvas_id, ServerEvent::UserLeft { user_id: session.user_id })
                .await;
        } else {
            self.sessions
                .broadcast_room(
                    session.canvas_id,
                    ServerEvent::TabClosed {
                        user_id: session.user_id,
                        tab_id: session.tab_id,
                    },
                )
                .await;
        }
        Ok(())
    }

    /// `execute_operation`: validate+apply+persist+record, then ack the
    /// sender and broadcast the diff to the rest of the room. A rejected
    /// operation never closes the socket — it is reported as
    /// `operation_rejected` and this returns `Ok(())`.
    pub async fn execute_operation(
        &self,
        socket_id: &str,
        payload: ExecuteOperationPayload,
        transaction_id: Option<String>,
    ) -> Result<()> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;

        match self
            .urs
            .execute_and_record(
                session.canvas_id,
                session.user_id,
                &payload.operation,
                payload.undo_data.as_ref(),
                transaction_id.as_deref(),
            )
            .await
        {
            Ok(outcome) => {
                self.sessions
                    .send_to_socket(
                        socket_id,
                        ServerEvent::OperationAck {
                            operation_id: payload.id.clone(),
                            state_version: outcome.state_version,
                        },
                    )
                    .await;
                self.sessions
                    .broadcast_room(
                        session.canvas_id,
                        ServerEvent::StateUpdate {
                            state_version: outcome.state_version,
                            changes: outcome.changes,
                            operation_id: Some(payload.id),
                            user_id: session.user_id,
                        },
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                let error: Error = e.into();
                self.sessions
                    .send_to_socket(
                        socket_id,
                        ServerEvent::OperationRejected {
                            operation_id: Some(payload.id),
                            error: error.to_string(),
                        },
                    )
                    .await;
                Ok(())
            }
        }
    }

    pub async fn request_full_sync(&self, socket_id: &str) -> Result<()> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        let cell = self.csm.lock_canvas(session.canvas_id).await?;
        let (nodes, version): (Vec<Node>, i64) = {
            let state = cell.lock().await;
            (state.nodes.values().cloned().collect(), state.version)
        };
        self.sessions
            .send_to_socket(socket_id, ServerEvent::FullStateSync { nodes, version })
            .await;
        Ok(())
    }

    pub async fn sync_check(&self, socket_id: &str, last_sequence: i64) -> Result<()> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        let rows = self
            .store
            .list_operations_after(session.canvas_id, last_sequence)
            .await?;
        let operations = rows.iter().map(UndoHistoryEntry::from).collect();
        self.sessions
            .send_to_socket(socket_id, ServerEvent::SyncResponse { operations })
            .await;
        Ok(())
    }

    /// Refresh the acting user's own undo/redo snapshot across every tab
    /// they have joined to this canvas.
    async fn push_undo_state(&self, canvas_id: i64, user_id: i64) -> Result<()> {
        let undo_state = self.history.get_user_undo_state(user_id, canvas_id).await?;
        let sockets = self.sessions.sockets_for_user_in_room(canvas_id, user_id).await;
        self.sessions
            .send_to_sockets(
                &sockets,
                ServerEvent::UndoStateUpdate {
                    cleared: false,
                    undo_state,
                },
            )
            .await;
        Ok(())
    }

    pub async fn undo_operation(&self, socket_id: &str) -> Result<()> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        match self.urs.handle_undo(session.canvas_id, session.user_id).await? {
            Some(outcome) => {
                self.sessions
                    .send_to_socket(
                        socket_id,
                        ServerEvent::UndoSuccess {
                            state_version: outcome.state_version,
                            conflicts: outcome.conflicts,
                        },
                    )
                    .await;
                self.sessions
                    .broadcast_room(
                        session.canvas_id,
                        ServerEvent::StateUpdate {
                            state_version: outcome.state_version,
                            changes: outcome.changes,
                            operation_id: None,
                            user_id: session.user_id,
                        },
                    )
                    .await;
                self.push_undo_state(session.canvas_id, session.user_id).await?;
                self.sessions
                    .broadcast_room_except_user(
                        session.canvas_id,
                        session.user_id,
                        ServerEvent::RemoteUndo {
                            user_id: session.user_id,
                            operation_ids: outcome.operation_ids,
                        },
                    )
                    .await;
            }
            None => {
                self.sessions
                    .send_to_socket(
                        socket_id,
                        ServerEvent::UndoFailed {
                            reason: "nothing to undo".to_string(),
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    pub async fn redo_operation(&self, socket_id: &str) -> Result<()> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        match self.urs.handle_redo(session.canvas_id, session.user_id).await? {
            Some(outcome) => {
                self.sessions
                    .send_to_socket(
                        socket_id,
                        ServerEvent::RedoSuccess {
                            state_version: outcome.state_version,
                        },
                    )
                    .await;
                self.sessions
                    .broadcast_room(
                        session.canvas_id,
                        ServerEvent::StateUpdate {
                            state_version: outcome.state_version,
                            changes: outcome.changes,
                            operation_id: None,
                            user_id: session.user_id,
                        },
                    )
                    .await;
                self.push_undo_state(session.canvas_id, session.user_id).await?;
                self.sessions
                    .broadcast_room_except_user(
                        session.canvas_id,
                        session.user_id,
                        ServerEvent::RemoteRedo {
                            user_id: session.user_id,
                            operation_ids: outcome.operation_ids,
                        },
                    )
                    .await;
            }
            None => {
                self.sessions
                    .send_to_socket(
                        socket_id,
                        ServerEvent::RedoFailed {
                            reason: "nothing to redo".to_string(),
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    pub async fn request_undo_state(&self, socket_id: &str) -> Result<()> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        let undo_state = self
            .history
            .get_user_undo_state(session.user_id, session.canvas_id)
            .await?;
        self.sessions
            .send_to_socket(
                socket_id,
                ServerEvent::UndoStateUpdate {
                    cleared: false,
                    undo_state,
                },
            )
            .await;
        Ok(())
    }

    pub async fn get_undo_history(
        &self,
        socket_id: &str,
        limit: i64,
        show_all_users: bool,
    ) -> Result<()> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        let rows = self
            .history
            .get_undo_history(
                session.canvas_id,
                Some(session.user_id),
                limit,
                show_all_users,
            )
            .await?;
        let operations = rows.iter().map(UndoHistoryEntry::from).collect();
        self.sessions
            .send_to_socket(socket_id, ServerEvent::UndoHistory { operations })
            .await;
        Ok(())
    }

    /// `clear_undo_history`: wipes the operations log for the canvas. Does
    /// not touch the live scene (spec §9) — only the undo/redo trail.
    pub async fn clear_undo_history(&self, socket_id: &str, canvas_id: i64) -> Result<()> {
        self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        self.history.clear_undo_history(canvas_id).await?;
        self.sessions
            .broadcast_room(canvas_id, ServerEvent::UndoHistoryCleared)
            .await;
        Ok(())
    }

    /// `begin_transaction`: open an atomic undo unit for this `(user,
    /// canvas)`. Returns the transaction id the gateway attaches to every
    /// subsequent `execute_operation` on this socket until it is closed.
    pub async fn begin_transaction(&self, socket_id: &str, source: Option<String>) -> Result<String> {
        let session = self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        if self
            .store
            .get_active_transaction(session.user_id, session.canvas_id)
            .await?
            .is_some()
        {
            return Err(Error::TransactionAlreadyActive);
        }
        let tx = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            user_id: session.user_id,
            canvas_id: session.canvas_id,
            source: source.unwrap_or_else(|| "client".to_string()),
            started_at: Utc::now(),
            state: TransactionState::Active,
        };
        self.store.begin_transaction(&tx).await?;
        self.sessions
            .send_to_socket(
                socket_id,
                ServerEvent::TransactionStarted {
                    transaction_id: tx.id.clone(),
                },
            )
            .await;
        Ok(tx.id)
    }

    pub async fn commit_transaction(&self, socket_id: &str, transaction_id: &str) -> Result<()> {
        self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        self.store.commit_transaction(transaction_id).await?;
        self.sessions
            .send_to_socket(
                socket_id,
                ServerEvent::TransactionCommitted {
                    transaction_id: transaction_id.to_string(),
                },
            )
            .await;
        Ok(())
    }

    /// `abort_transaction`: marks the bundle aborted without rolling back
    /// any operation already applied within it (spec §9, "Open Questions").
    pub async fn abort_transaction(&self, socket_id: &str, transaction_id: &str) -> Result<()> {
        self.sessions.get(socket_id).await.ok_or(Error::NotJoined)?;
        self.store.abort_transaction(transaction_id).await?;
        self.sessions
            .send_to_socket(
                socket_id,
                ServerEvent::TransactionAborted {
                    transaction_id: transaction_id.to_string(),
                },
            )
            .await;
        Ok(())
    }

    pub async fn ping(&self, socket_id: &str, ts: i64) {
        self.sessions.touch_ping(socket_id).await;
        self.sessions.send_to_socket(socket_id, ServerEvent::Pong { ts }).await;
    }
}
