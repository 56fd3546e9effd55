//! Error types for the persistence facade.

/// Errors raised by the persistence facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying SQL engine returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A JSON blob stored in a column failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row referenced by id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A maintenance operation refused to run because it looked destructive.
    #[error("refused: {0}")]
    Refused(String),
}

impl Error {
    /// Stable machine-readable code for this error, used in protocol-facing
    /// error payloads by callers higher up the stack.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) => "DATABASE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Refused(_) => "REFUSED",
        }
    }
}

/// Convenience result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
