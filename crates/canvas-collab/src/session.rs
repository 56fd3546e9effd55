//! Session registry: the process-wide socket/room bookkeeping shared by
//! every connection handler.
//!
//! `socketSessions`, `userSockets`, and `canvasRooms` are each backed by a
//! `tokio::sync::RwLock`-guarded map per the concurrency note that reads of
//! these maps are concurrent with writes and must be synchronized.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

use crate::protocol::ServerEvent;

/// One active connection: a socket joined to exactly one canvas room.
#[derive(Debug, Clone)]
pub struct Session {
    pub socket_id: String,
    pub user_id: i64,
    pub canvas_id: i64,
    pub tab_id: String,
    pub joined_at: DateTime<Utc>,
    pub last_ping: DateTime<Utc>,
}

/// What changed in room membership as a result of a join, used to decide
/// which of `user_joined`/`active_users`/`tab_closed` to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinEffect {
    pub is_first_session_for_user: bool,
    pub room_had_existing_sockets: bool,
}

/// What changed in room membership as a result of a leave.
#[derive(Debug, Clone)]
pub struct LeaveEffect {
    pub session: Session,
    pub was_last_session_for_user: bool,
}

/// The process-wide connection registry: every gateway handler goes through
/// this to join/leave rooms and to resolve broadcast targets.
#[derive(Default)]
pub struct SessionRegistry {
    sockets: RwLock<HashMap<String, Session>>,
    user_sockets: RwLock<HashMap<i64, HashSet<String>>>,
    canvas_rooms: RwLock<HashMap<i64, HashSet<String>>>,
    outbound: RwLock<HashMap<String, mpsc::UnboundedSender<ServerEvent>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the per-socket outbound channel a gateway handler reads
    /// from to push events without blocking on the socket's own read loop.
    pub async fn register_outbound(&self, socket_id: &str, tx: mpsc::UnboundedSender<ServerEvent>) {
        self.outbound.write().await.insert(socket_id.to_string(), tx);
    }

    pub async fn unregister_outbound(&self, socket_id: &str) {
        self.outbound.write().await.remove(socket_id);
    }

    /// Attach a session to its canvas room.
    pub async fn join(&self, session: Session) -> JoinEffect {
        let socket_id = session.socket_id.clone();
        let user_id = session.user_id;
        let canvas_id = session.canvas_id;

        let room_had_existing_sockets = self
            .canvas_rooms
            .read()
            .await
            .get(&canvas_id)
            .is_some_and(|s| !s.is_empty());
        let is_first_session_for_user = self
            .user_sessions_in_room(user_id, canvas_id)
            .await
            .is_empty();

        self.sockets.write().await.insert(socket_id.clone(), session);
        self.user_sockets
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(socket_id.clone());
        self.canvas_rooms
            .write()
            .await
            .entry(canvas_id)
            .or_default()
            .insert(socket_id);

        JoinEffect {
            is_first_session_for_user,
            room_had_existing_sockets,
        }
    }

    /// Detach a socket from all bookkeeping (clean `leave_canvas` or a
    /// dropped connection — both are handled identically).
    pub async fn leave(&self, socket_id: &str) -> Option<LeaveEffect> {
        let session = self.sockets.write().await.remove(socket_id)?;

        if let Some(rooms) = self.canvas_rooms.write().await.get_mut(&session.canvas_id) {
            rooms.remove(socket_id);
        }
        {
            let mut users = self.user_sockets.write().await;
            if let Some(sockets) = users.get_mut(&session.user_id) {
                sockets.remove(socket_id);
                if sockets.is_empty() {
                    users.remove(&session.user_id);
                }
            }
        }
        self.outbound.write().await.remove(socket_id);

        let was_last_session_for_user = self
            .user_sessions_in_room(session.user_id, session.canvas_id)
            .await
            .is_empty();

        Some(LeaveEffect {
            session,
            was_last_session_for_user,
        })
    }

    /// A user's socket ids, restricted to the ones currently joined to a
    /// specific canvas's room.
    async fn user_sessions_in_room(&self, user_id: i64, canvas_id: i64) -> Vec<String> {
        let candidate = self
            .user_sockets
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        if candidate.is_empty() {
            return Vec::new();
        }
        let sockets = self.sockets.read().await;
        candidate
            .into_iter()
            .filter(|id| sockets.get(id).is_some_and(|s| s.canvas_id == canvas_id))
            .collect()
    }

    pub async fn get(&self, socket_id: &str) -> Option<Session> {
        self.sockets.read().await.get(socket_id).cloned()
    }

    pub async fn touch_ping(&self, socket_id: &str) {
        if let Some(session) = self.sockets.write().await.get_mut(socket_id) {
            session.last_ping = Utc::now();
        }
    }

    /// Every socket currently joined to a canvas's room.
    pub async fn sockets_in_room(&self, canvas_id: i64) -> Vec<String> {
        self.canvas_rooms
            .read()
            .await
            .get(&canvas_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A user's sockets, restricted to the ones joined to this canvas's
    /// room (the `undo_state_update`/`remote_undo` routing scope).
    pub async fn sockets_for_user_in_room(&self, canvas_id: i64, user_id: i64) -> Vec<String> {
        self.user_sessions_in_room(user_id, canvas_id).await
    }

    /// Whether a user has at least one session joined to a canvas's room.
    pub async fn user_present(&self, canvas_id: i64, user_id: i64) -> bool {
        !self.user_sessions_in_room(user_id, canvas_id).await.is_empty()
    }

    /// Distinct `(user_id, tab_count)` pairs present in a room, used for
    /// `active_users`.
    pub async fn distinct_users_in_room(&self, canvas_id: i64) -> Vec<(i64, usize)> {
        let sockets = self.sockets.read().await;
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for s in sockets.values().filter(|s| s.canvas_id == canvas_id) {
            *counts.entry(s.user_id).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }

    /// Push one event to a single socket's outbound channel, if it is
    /// still registered (a send failure here just means the connection has
    /// already torn down; callers don't treat it as fatal).
    pub async fn send_to_socket(&self, socket_id: &str, event: ServerEvent) {
        if let Some(tx) = self.outbound.read().await.get(socket_id) {
            let _ = tx.send(event);
        }
    }

    pub async fn send_to_sockets(&self, socket_ids: &[String], event: ServerEvent) {
        let outbound = self.outbound.read().await;
        for id in socket_ids {
            if let Some(tx) = outbound.get(id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Broadcast to every socket in a room.
    pub async fn broadcast_room(&self, canvas_id: i64, event: ServerEvent) {
        let sockets = self.sockets_in_room(canvas_id).await;
        self.send_to_sockets(&sockets, event).await;
    }

    /// Broadcast to every socket in a room except the given user's own
    /// sockets (the `remote_undo`/`remote_redo` awareness scope).
    pub async fn broadcast_room_except_user(&self, canvas_id: i64, user_id: i64, event: ServerEvent) {
        let all = self.sockets_in_room(canvas_id).await;
        let excluded: HashSet<String> = self
            .sockets_for_user_in_room(canvas_id, user_id)
            .await
            .into_iter()
            .collect();
        let targets: Vec<String> = all.into_iter().filter(|s| !excluded.contains(s)).collect();
        self.send_to_sockets(&targets, event).await;
    }

    /// A socket belonging to the same room, preferring one owned by
    /// `prefer_user_id`, used for the client-to-client join bootstrap.
    pub async fn pick_reconciliation_socket(
        &self,
        canvas_id: i64,
        prefer_user_id: i64,
        exclude_socket_id: &str,
    ) -> Option<String> {
        let sockets = self.sockets.read().await;
        let mut same_user = None;
        let mut any = None;
        for s in sockets
            .values()
            .filter(|s| s.canvas_id == canvas_id && s.socket_id != exclude_socket_id)
        {
            if s.user_id == prefer_user_id && same_user.is_none() {
                same_user = Some(s.socket_id.clone());
            }
            if any.is_none() {
                any = Some(s.socket_id.clone());
            }
        }
        same_user.or(any)
    }

    pub fn default_tab_id() -> String {
        format!("tab-{}", Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(socket: &str, user: i64, canvas: i64) -> Session {
        Session {
            socket_id: socket.to_string(),
            user_id: user,
            canvas_id: canvas,
            tab_id: "tab-1".to_string(),
            joined_at: Utc::now(),
            last_ping: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_tab_of_same_user_is_not_first_session() {
        let registry = SessionRegistry::new();
        let e1 = registry.join(session("s1", 1, 42)).await;
        assert!(e1.is_first_session_for_user);
        assert!(!e1.room_had_existing_sockets);

        let e2 = registry.join(session("s2", 1, 42)).await;
        assert!(!e2.is_first_session_for_user);
        assert!(e2.room_had_existing_sockets);
    }

    #[tokio::test]
    async fn leave_reports_last_session_for_user_only_after_both_tabs_close() {
        let registry = SessionRegistry::new();
        registry.join(session("s1", 1, 42)).await;
        registry.join(session("s2", 1, 42)).await;

        let leave1 = registry.leave("s1").await.unwrap();
        assert!(!leave1.was_last_session_for_user);

        let leave2 = registry.leave("s2").await.unwrap();
        assert!(leave2.was_last_session_for_user);
    }

    #[tokio::test]
    async fn user_present_reflects_room_membership() {
        let registry = SessionRegistry::new();
        assert!(!registry.user_present(42, 1).await);
        registry.join(session("s1", 1, 42)).await;
        assert!(registry.user_present(42, 1).await);
        registry.leave("s1").await;
        assert!(!registry.user_present(42, 1).await);
    }

    #[tokio::test]
    async fn sockets_for_user_in_room_excludes_other_canvases() {
        let registry = SessionRegistry::new();
        registry.join(session("s1", 1, 42)).await;
        registry.join(session("s2", 1, 7)).await;
        let sockets = registry.sockets_for_user_in_room(42, 1).await;
        assert_eq!(sockets, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn second_session_in_different_canvas_is_still_first_for_that_room() {
        let registry = SessionRegistry::new();
        registry.join(session("s1", 1, 42)).await;
        let effect = registry.join(session("s2", 1, 7)).await;
        assert!(effect.is_first_session_for_user);
    }
}
