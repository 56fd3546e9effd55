//! HTTP upload ingestion (spec §4.4, step 1-4): accept, validate, hash,
//! write to disk, and record a `files` row. The multipart parsing itself is
//! the HTTP framework's job (owned by the root binary); this module takes
//! already-buffered bytes plus declared metadata.

use chrono::Utc;

use canvas_store::{FileRecord, ProcessingStatus, Store};

use crate::config::MediaConfig;
use crate::error::{Error, Result};
use crate::hash::{extension_of, hash_bytes, mint_filename};

/// What the caller needs to decide after an upload completes: whether
/// video transcoding should be enqueued, and the identity of the stored
/// file.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub hash: String,
    pub is_image: bool,
    pub is_video: bool,
}

/// Validate an incoming upload's declared MIME type and size against the
/// spec's admission rules (§4.4: `image/*` or `video/*`, ≤500 MiB).
pub fn validate_upload(mime_type: &str, size: u64, config: &MediaConfig) -> Result<()> {
    if !(mime_type.starts_with("image/") || mime_type.starts_with("video/")) {
        return Err(Error::Rejected(format!(
            "unsupported content type: {mime_type}"
        )));
    }
    if size > config.max_upload_bytes {
        return Err(Error::Rejected(format!(
            "file too large: {size} bytes exceeds {} byte limit",
            config.max_upload_bytes
        )));
    }
    Ok(())
}

/// Write an uploaded file's bytes to `uploads/` and insert its `files` row.
/// Deduplicates by content hash: if the client already knows the hash and a
/// row for it exists, the existing record is returned without rewriting the
/// file to disk.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_upload(
    store: &Store,
    config: &MediaConfig,
    data: &[u8],
    original_name: &str,
    mime_type: &str,
    client_hash: Option<&str>,
    user_id: Option<i64>,
    canvas_id: Option<i64>,
) -> Result<UploadOutcome> {
    validate_upload(mime_type, data.len() as u64, config)?;

    let hash = match client_hash {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => hash_bytes(data),
    };

    if let Some(existing) = store.get_file_by_hash(&hash).await? {
        return Ok(UploadOutcome {
            filename: existing.filename,
            original_name: existing.original_name,
            mime_type: existing.mime_type,
            size: existing.size as u64,
            hash: existing.hash,
            is_image: existing.mime_type.starts_with("image/"),
            is_video: existing.mime_type.starts_with("video/"),
        });
    }

    let ext = extension_of(original_name);
    let filename = mint_filename(if ext.is_empty() { "bin" } else { &ext });

    tokio::fs::create_dir_all(&config.uploads_dir).await?;
    let path = config.uploads_dir.join(&filename);
    tokio::fs::write(&path, data).await?;

    let record = FileRecord {
        filename: filename.clone(),
        original_name: original_name.to_string(),
        mime_type: mime_type.to_string(),
        size: data.len() as i64,
        hash: hash.clone(),
        user_id,
        canvas_id,
        processed_formats: None,
        processing_status: ProcessingStatus::Pending,
        processing_error: None,
        created_at: Utc::now(),
    };
    store.insert_file(&record).await?;

    Ok(UploadOutcome {
        filename,
        original_name: original_name.to_string(),
        mime_type: mime_type.to_string(),
        size: data.len() as u64,
        hash,
        is_image: mime_type.starts_with("image/"),
        is_video: mime_type.starts_with("video/"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn harness() -> (Store, MediaConfig, tempfile::TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.init().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = MediaConfig {
            uploads_dir: dir.path().join("uploads"),
            ..MediaConfig::default()
        };
        (store, config, dir)
    }

    #[tokio::test]
    async fn rejects_oversized_and_wrong_type() {
        let config = MediaConfig::default();
        assert!(validate_upload("text/plain", 10, &config).is_err());
        assert!(validate_upload("image/png", config.max_upload_bytes + 1, &config).is_err());
        assert!(validate_upload("image/png", 10, &config).is_ok());
    }

    #[tokio::test]
    async fn ingest_writes_file_and_dedupes_by_hash() {
        let (store, config, _dir) = harness().await;
        let data = b"fake png bytes".to_vec();

        let first = ingest_upload(&store, &config, &data, "photo.png", "image/png", None, None, None)
            .await
            .unwrap();
        assert!(config.uploads_dir.join(&first.filename).exists());

        let second = ingest_upload(&store, &config, &data, "dup.png", "image/png", None, None, None)
            .await
            .unwrap();
        assert_eq!(first.hash, second.hash);
        assert_eq!(first.filename, second.filename);
    }
}
