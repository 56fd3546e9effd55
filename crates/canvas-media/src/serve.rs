//! Content-negotiated media serving (spec §4.4, §6): pick the best
//! available rendition of a stored file for a requesting client.

use std::path::PathBuf;

use canvas_store::FileRecord;

use crate::config::MediaConfig;

/// The concrete file to serve for a request, alongside its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeChoice {
    pub path: PathBuf,
    pub mime_type: String,
}

/// Choose which rendition of a video to serve given the client's `Accept`
/// header and the formats recorded in `files.processed_formats`. Prefers
/// WebM, then MP4, then falls back to the original upload (spec §4.4:
/// "serve the original while transcoding is pending or failed").
pub fn choose_video_rendition(config: &MediaConfig, file: &FileRecord, accept: &str) -> ServeChoice {
    let basename = basename_of(&file.filename);
    let available: Vec<String> = file
        .processed_formats
        .as_deref()
        .and_then(|json| serde_json::from_str::<Vec<String>>(json).ok())
        .unwrap_or_default();

    let accepts_webm = accept.contains("video/webm") || accept.contains("*/*");
    let accepts_mp4 = accept.contains("video/mp4") || accept.contains("*/*");

    if accepts_webm && available.iter().any(|f| f == "webm") {
        return ServeChoice {
            path: config.transcodes_dir.join(format!("{basename}.webm")),
            mime_type: "video/webm".to_string(),
        };
    }
    if accepts_mp4 && available.iter().any(|f| f == "mp4") {
        return ServeChoice {
            path: config.transcodes_dir.join(format!("{basename}.mp4")),
            mime_type: "video/mp4".to_string(),
        };
    }
    ServeChoice {
        path: config.uploads_dir.join(&file.filename),
        mime_type: file.mime_type.clone(),
    }
}

/// The original upload's path, used for images and as the video fallback.
pub fn original_path(config: &MediaConfig, file: &FileRecord) -> PathBuf {
    config.uploads_dir.join(&file.filename)
}

fn basename_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| filename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_store::ProcessingStatus;
    use chrono::Utc;

    fn sample(processed: Option<&str>) -> FileRecord {
        FileRecord {
            filename: "1700000000000-abc123.mov".to_string(),
            original_name: "clip.mov".to_string(),
            mime_type: "video/quicktime".to_string(),
            size: 1024,
            hash: "deadbeef".to_string(),
            user_id: None,
            canvas_id: None,
            processed_formats: processed.map(str::to_string),
            processing_status: ProcessingStatus::Completed,
            processing_error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prefers_webm_when_both_available() {
        let config = MediaConfig::default();
        let file = sample(Some(r#"["webm","mp4"]"#));
        let choice = choose_video_rendition(&config, &file, "video/webm,video/mp4");
        assert_eq!(choice.mime_type, "video/webm");
    }

    #[test]
    fn falls_back_to_mp4_when_webm_unaccepted() {
        let config = MediaConfig::default();
        let file = sample(Some(r#"["webm","mp4"]"#));
        let choice = choose_video_rendition(&config, &file, "video/mp4");
        assert_eq!(choice.mime_type, "video/mp4");
    }

    #[test]
    fn falls_back_to_original_when_nothing_processed() {
        let config = MediaConfig::default();
        let file = sample(None);
        let choice = choose_video_rendition(&config, &file, "video/webm");
        assert_eq!(choice.mime_type, "video/quicktime");
        assert_eq!(choice.path, config.uploads_dir.join(&file.filename));
    }
}
