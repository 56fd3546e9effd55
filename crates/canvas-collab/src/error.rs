//! Error types for the collaboration manager.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] canvas_store::Error),

    #[error(transparent)]
    Core(#[from] canvas_core::Error),

    #[error(transparent)]
    History(#[from] canvas_history::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown canvas: {0}")]
    UnknownCanvas(i64),

    #[error("session not joined to a canvas")]
    NotJoined,

    #[error("a transaction is already active for this user on this canvas")]
    TransactionAlreadyActive,

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("operation too large: {0} bytes exceeds the 100 KiB limit")]
    PayloadTooLarge(usize),

    #[error("unrecognized event: {0}")]
    UnknownEvent(String),
}

impl Error {
    /// Stable machine-readable code surfaced in `operation_rejected`/`error`
    /// wire messages.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Store(e) => e.code(),
            Error::Core(e) => e.code(),
            Error::History(e) => e.code(),
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::UnknownCanvas(_) => "CANVAS_NOT_FOUND",
            Error::NotJoined => "NOT_JOINED",
            Error::TransactionAlreadyActive => "TRANSACTION_ALREADY_ACTIVE",
            Error::NoActiveTransaction => "NO_ACTIVE_TRANSACTION",
            Error::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Error::UnknownEvent(_) => "UNKNOWN_EVENT",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
