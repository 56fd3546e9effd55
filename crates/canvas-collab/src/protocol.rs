//! The wire protocol: every ingress event the gateway accepts and every
//! egress event it can emit (message surface / egress tables).
//!
//! Both directions are JSON objects tagged by an `event` field with the
//! rest of the payload nested under `payload`, mirroring the
//! `{type, params}` envelope `canvas_core::Operation` already uses for the
//! operation catalog.

use canvas_core::{ChangeSet, Node, Operation};
use canvas_history::UndoState;
use canvas_store::OperationRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `execute_operation`'s envelope: a client-minted operation id wrapping
/// one catalog operation, plus the client's snapshot of how to invert it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOperationPayload {
    pub id: String,
    #[serde(flatten)]
    pub operation: Operation,
    #[serde(default)]
    pub undo_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCanvasPayload {
    pub canvas_id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub tab_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFullSyncPayload {
    pub canvas_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckPayload {
    pub last_sequence: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUndoHistoryPayload {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
    #[serde(default)]
    pub show_all_users: bool,
}

fn default_history_limit() -> i64 {
    50
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearUndoHistoryPayload {
    pub canvas_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginTransactionPayload {
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    pub ts: i64,
}

/// Every event the gateway accepts from a connected socket. `canvas_operation`
/// is the legacy form: same inner shape as `execute_operation`, translated
/// to the same handling path.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinCanvas(JoinCanvasPayload),
    LeaveCanvas,
    ExecuteOperation(ExecuteOperationPayload),
    CanvasOperation(ExecuteOperationPayload),
    RequestFullSync(RequestFullSyncPayload),
    SyncCheck(SyncCheckPayload),
    UndoOperation,
    RedoOperation,
    RequestUndoState,
    GetUndoHistory(GetUndoHistoryPayload),
    ClearUndoHistory(ClearUndoHistoryPayload),
    BeginTransaction(BeginTransactionPayload),
    CommitTransaction,
    AbortTransaction,
    Ping(PingPayload),
}

/// A user entry as shown in `active_users`/`user_joined`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub color: String,
    pub tab_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoHistoryEntry {
    pub operation_id: String,
    pub op_type: String,
    pub user_id: i64,
    pub params: Value,
    pub undo_data: Option<Value>,
    pub state: &'static str,
    pub sequence_number: i64,
}

impl From<&OperationRecord> for UndoHistoryEntry {
    fn from(row: &OperationRecord) -> Self {
        Self {
            operation_id: row.id.clone(),
            op_type: row.op_type.clone(),
            user_id: row.user_id,
            params: serde_json::from_str(&row.params).unwrap_or(Value::Null),
            undo_data: row
                .undo_data
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            state: row.state.as_str(),
            sequence_number: row.sequence_number,
        }
    }
}

/// Every event the gateway can emit, either to one socket, a user's
/// sockets, or a whole room (routing rules).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    CanvasJoined {
        canvas_id: i64,
        user_id: i64,
        color: String,
        nodes: Vec<Node>,
        version: i64,
    },
    ActiveUsers {
        users: Vec<ActiveUser>,
    },
    UserJoined {
        user: ActiveUser,
    },
    UserLeft {
        user_id: i64,
    },
    TabClosed {
        user_id: i64,
        tab_id: String,
    },
    StateUpdate {
        state_version: i64,
        changes: ChangeSet,
        operation_id: Option<String>,
        user_id: i64,
    },
    FullStateSync {
        nodes: Vec<Node>,
        version: i64,
    },
    OperationAck {
        operation_id: String,
        state_version: i64,
    },
    OperationRejected {
        operation_id: Option<String>,
        error: String,
    },
    UndoStateUpdate {
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        cleared: bool,
        undo_state: UndoState,
    },
    UndoSuccess {
        state_version: i64,
        conflicts: Vec<String>,
    },
    RedoSuccess {
        state_version: i64,
    },
    UndoFailed {
        reason: String,
    },
    RedoFailed {
        reason: String,
    },
    UndoHistory {
        operations: Vec<UndoHistoryEntry>,
    },
    UndoHistoryCleared,
    TransactionStarted {
        transaction_id: String,
    },
    TransactionCommitted {
        transaction_id: String,
    },
    TransactionAborted {
        transaction_id: String,
    },
    Pong {
        ts: i64,
    },
    SyncResponse {
        operations: Vec<UndoHistoryEntry>,
    },
    Error {
        message: String,
    },
    /// Awareness signal for other users when someone undoes/redoes
    /// (routed to the room, excluding the acting user's own sockets).
    RemoteUndo {
        user_id: i64,
        operation_ids: Vec<String>,
    },
    RemoteRedo {
        user_id: i64,
        operation_ids: Vec<String>,
    },
    /// Client-to-client bootstrap shortcut: ask an already-joined socket to
    /// push its view of the scene to a just-joined one.
    RequestCanvasState {
        for_socket_id: String,
    },
    VideoProcessingStart {
        filename: String,
    },
    VideoProcessingProgress {
        filename: String,
        format: String,
        percent: f64,
    },
    VideoProcessingComplete {
        filename: String,
        success: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        formats: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
