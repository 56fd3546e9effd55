//! Error types for the Canvas State Manager.

/// Errors raised while validating or applying an operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation failed structural validation (missing/malformed params).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The persistence facade returned an error while loading or saving a
    /// canvas. Fatal for the operation in flight: it must not be
    /// acknowledged or broadcast (spec §7, "Persistence failure").
    #[error(transparent)]
    Store(#[from] canvas_store::Error),

    /// A scene blob failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The referenced canvas does not exist.
    #[error("canvas not found: {0}")]
    CanvasNotFound(i64),
}

impl Error {
    /// Stable machine-readable code surfaced in `operation_rejected`/`error`
    /// wire messages.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Store(_) => "PERSISTENCE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::CanvasNotFound(_) => "CANVAS_NOT_FOUND",
        }
    }
}

/// Convenience result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
