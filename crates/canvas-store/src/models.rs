//! Row types for the persisted schema. These are the facade's public
//! vocabulary; higher-level crates convert to/from their own richer types
//! at the boundary rather than leaking `sqlx::Row` upward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user, keyed by a unique username.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// A canvas row. `canvas_data` is the serialized `{nodes, version}` scene
/// blob; callers that need the scene graph deserialize it via `canvas-core`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canvas {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub canvas_data: String,
    pub last_modified: DateTime<Utc>,
}

/// A row in the append-only operations log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    pub canvas_id: i64,
    pub user_id: i64,
    pub op_type: String,
    pub params: String,
    pub undo_data: Option<String>,
    pub transaction_id: Option<String>,
    pub sequence_number: i64,
    pub state: OperationState,
    pub timestamp: DateTime<Utc>,
    pub undone_at: Option<DateTime<Utc>>,
    pub undone_by: Option<i64>,
    pub redone_at: Option<DateTime<Utc>>,
    pub redone_by: Option<i64>,
}

/// Applied/undone state of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Applied,
    Undone,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Applied => "applied",
            OperationState::Undone => "undone",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "undone" => OperationState::Undone,
            _ => OperationState::Applied,
        }
    }
}

/// A transaction bundle (an atomic undo unit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: i64,
    pub canvas_id: i64,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub state: TransactionState,
}

/// Lifecycle state of a transaction bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "committed" => TransactionState::Committed,
            "aborted" => TransactionState::Aborted,
            _ => TransactionState::Active,
        }
    }
}

/// Processing lifecycle of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

/// An uploaded file and its transcoding state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub hash: String,
    pub user_id: Option<i64>,
    pub canvas_id: Option<i64>,
    pub processed_formats: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted connection record (best-effort bookkeeping; the in-memory
/// collaboration manager is the source of truth while the process is up).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub socket_id: String,
    pub user_id: i64,
    pub canvas_id: i64,
    pub tab_id: String,
    pub joined_at: DateTime<Utc>,
    pub last_ping: DateTime<Utc>,
}

/// Canvas-level viewport/navigation state (`/canvases/:id/state`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasNavigationState {
    pub canvas_id: i64,
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-user viewport state, distinct from the canvas-level one above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserViewportState {
    pub user_id: i64,
    pub canvas_id: i64,
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub updated_at: DateTime<Utc>,
}

/// A collaborator grant on a canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasCollaborator {
    pub canvas_id: i64,
    pub user_id: i64,
    pub role: String,
    pub added_at: DateTime<Utc>,
}

/// A named snapshot of a canvas's scene blob, kept alongside the live row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasVersion {
    pub id: i64,
    pub canvas_id: i64,
    pub canvas_data: String,
    pub created_at: DateTime<Utc>,
    pub label: Option<String>,
}
