//! The Media Pipeline (spec §4.4): upload ingestion, thumbnail derivation,
//! video transcoding, content-negotiated serving, and periodic cleanup of
//! orphaned files.

mod cleanup;
mod config;
mod error;
mod hash;
mod serve;
mod thumbnail;
mod transcode;
mod upload;

pub use cleanup::{database_size, run_cleanup, run_cleanup_scheduler, CleanupReport, DatabaseSizeReport};
pub use config::{MediaConfig, THUMBNAIL_BATCH, THUMBNAIL_SIZES};
pub use error::{Error, Result};
pub use hash::{extension_of, hash_bytes, mint_filename};
pub use serve::{choose_video_rendition, original_path, ServeChoice};
pub use thumbnail::{generate_default_thumbnails, generate_thumbnails, poster_path, thumbnail_path};
pub use transcode::{
    needs_transcode, probe_media, target_dimensions, ProbeInfo, TranscodeFormat, TranscodeJob,
    TranscodeObserver, TranscodeQueue, TranscodeResult,
};
pub use upload::{ingest_upload, validate_upload, UploadOutcome};
