//! Multi-size thumbnail derivation (spec §4.4).
//!
//! For each requested size, the source is resized to fit within
//! `size × size` preserving aspect ratio, encoded as lossless WebP (the
//! `image` crate's WebP encoder has no lossy/quality-controlled mode), and
//! written to `thumbnails/<size>/<basename>.webp`. Sizes exceeding the
//! source's longest edge are skipped, as are sizes whose output already
//! exists. Generation runs in a blocking task (image decode/encode is
//! CPU-bound) and sizes are batched two at a time to bound peak memory.
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::GenericImageView;
use tracing::warn;

use crate::config::{MediaConfig, THUMBNAIL_BATCH, THUMBNAIL_SIZES};
use crate::error::Result;

/// Output path for one size of one source basename.
pub fn thumbnail_path(config: &MediaConfig, size: u32, basename: &str) -> PathBuf {
    config
        .thumbnails_dir
        .join(size.to_string())
        .join(format!("{basename}.webp"))
}

/// Generate every requested thumbnail size for `source_path`, skipping sizes
/// that exceed the source's longest edge or that already exist on disk.
/// Per-size failures are logged and swallowed — thumbnailing is best-effort
/// (spec §4.4, "non-critical").
pub async fn generate_thumbnails(
    config: &MediaConfig,
    source_path: &Path,
    basename: &str,
    sizes: &[u32],
) -> Result<Vec<u32>> {
    let (width, height) = {
        let path = source_path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(u32, u32)> {
            let img = image::open(&path)?;
            Ok(img.dimensions())
        })
        .await
        .map_err(|e| crate::error::Error::Subprocess(e.to_string()))??
    };
    let longest_edge = width.max(height);

    let mut generated = Vec::new();
    for chunk in sizes.chunks(THUMBNAIL_BATCH) {
        let mut handles = Vec::new();
        for &size in chunk {
            if size as u64 > longest_edge as u64 {
                continue;
            }
            let out_path = thumbnail_path(config, size, basename);
            if out_path.exists() {
                generated.push(size);
                continue;
            }
            let source_path = source_path.to_path_buf();
            handles.push((size, out_path.clone(), tokio::task::spawn_blocking(move || {
                encode_one(&source_path, &out_path, size)
            })));
        }
        for (size, out_path, handle) in handles {
            match handle.await {
                Ok(Ok(())) => generated.push(size),
                Ok(Err(e)) => warn!(size, path = %out_path.display(), error = %e, "thumbnail generation failed"),
                Err(e) => warn!(size, error = %e, "thumbnail task panicked"),
            }
        }
    }
    Ok(generated)
}

/// Convenience wrapper over [`THUMBNAIL_SIZES`], the default size set.
pub async fn generate_default_thumbnails(
    config: &MediaConfig,
    source_path: &Path,
    basename: &str,
) -> Result<Vec<u32>> {
    generate_thumbnails(config, source_path, basename, THUMBNAIL_SIZES).await
}

fn encode_one(source_path: &Path, out_path: &Path, size: u32) -> Result<()> {
    let img = image::open(source_path)?;
    let resized = img.resize(size, size, FilterType::Lanczos3);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    resized.save_with_format(out_path, image::ImageFormat::WebP)?;
    Ok(())
}

/// A single-frame thumbnail for a video's poster (spec §4.4's
/// `video_processing` job): scaled to a fixed width, generated from a
/// pre-extracted frame image at the caller's chosen timestamp.
pub fn poster_path(config: &MediaConfig, basename: &str) -> PathBuf {
    config.thumbnails_dir.join("poster").join(format!("{basename}.webp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_path_nests_by_size() {
        let config = MediaConfig::default();
        let p = thumbnail_path(&config, 256, "abc123");
        assert_eq!(p, config.thumbnails_dir.join("256").join("abc123.webp"));
    }
}
