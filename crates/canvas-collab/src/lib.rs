//! The Collaboration Manager (spec §4.2): session/room bookkeeping, the
//! WebSocket wire protocol, and the orchestration that ties the Canvas
//! State Manager and Operation History/Undo-Redo Sync together for a live
//! connection.

mod error;
mod gateway;
mod manager;
mod media_observer;
mod palette;
mod protocol;
mod session;

pub use error::{Error, Result};
pub use gateway::ws_upgrade;
pub use manager::CollaborationManager;
pub use media_observer::RoomTranscodeObserver;
pub use palette::{color_for, USER_COLOR_PALETTE};
pub use protocol::{
    ActiveUser, BeginTransactionPayload, ClearUndoHistoryPayload, ClientEvent,
    ExecuteOperationPayload, GetUndoHistoryPayload, JoinCanvasPayload, PingPayload,
    RequestFullSyncPayload, ServerEvent, SyncCheckPayload, UndoHistoryEntry,
};
pub use session::{JoinEffect, LeaveEffect, Session, SessionRegistry};
