//! Error types for operation history and undo/redo orchestration.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] canvas_store::Error),

    #[error(transparent)]
    Core(#[from] canvas_core::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Store(_) => "PERSISTENCE_ERROR",
            Error::Core(_) => "CSM_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::NothingToUndo => "NOTHING_TO_UNDO",
            Error::NothingToRedo => "NOTHING_TO_REDO",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
