//! Error types for the media pipeline.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] canvas_store::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("refused: {0}")]
    Refused(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Store(_) => "PERSISTENCE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Image(_) => "IMAGE_ERROR",
            Error::Rejected(_) => "UPLOAD_REJECTED",
            Error::Subprocess(_) => "SUBPROCESS_ERROR",
            Error::Refused(_) => "REFUSED",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
