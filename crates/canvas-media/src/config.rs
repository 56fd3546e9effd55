//! Tunables for the media pipeline (spec §4.4), layered into the root
//! binary's `CanvasServerConfig` and passed down at construction time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Thumbnail sizes generated for every uploaded image, longest-edge pixels.
pub const THUMBNAIL_SIZES: &[u32] = &[64, 128, 256, 512, 1024, 2048];

/// How many thumbnail sizes are encoded concurrently per file.
pub const THUMBNAIL_BATCH: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct MediaConfig {
    /// Directory uploaded originals are written to.
    pub uploads_dir: PathBuf,
    /// Directory thumbnail derivatives are written to (one subdir per size).
    pub thumbnails_dir: PathBuf,
    /// Directory transcoded video outputs are written to.
    pub transcodes_dir: PathBuf,
    /// Hard cap on a single upload's size.
    pub max_upload_bytes: u64,
    /// `ffprobe` binary, resolved on `PATH` unless overridden.
    pub ffprobe_bin: String,
    /// `ffmpeg` binary, resolved on `PATH` unless overridden.
    pub ffmpeg_bin: String,
    /// Whether the MP4/H.264 transcode output is enabled alongside WebM/VP9.
    pub enable_mp4_output: bool,
    /// Delete the original video file once at least one transcoded format
    /// succeeds.
    pub delete_original_after_transcode: bool,
    /// Interval between cleanup sweeps.
    pub cleanup_interval_secs: u64,
    /// Delay before the first cleanup sweep after startup.
    pub cleanup_initial_delay_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            thumbnails_dir: PathBuf::from("thumbnails"),
            transcodes_dir: PathBuf::from("transcodes"),
            max_upload_bytes: 500 * 1024 * 1024,
            ffprobe_bin: "ffprobe".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            enable_mp4_output: false,
            delete_original_after_transcode: false,
            cleanup_interval_secs: 6 * 60 * 60,
            cleanup_initial_delay_secs: 30 * 60,
        }
    }
}
