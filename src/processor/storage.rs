//! Normalised image persistence
//!
//! Decoding, hashing, resizing and JPEG encoding are CPU-bound and run on
//! the blocking pool. Files are written atomically through a temp file in the
//! target directory, so a crash never leaves a truncated image behind.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::download::ItemError;
use super::fingerprint::content_id;
use crate::utils::JPEG_QUALITY;

/// An image written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub image_id: String,
    pub path: PathBuf,
}

/// Write `contents` to `path` via a temp file and rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no parent directory")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(contents)?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Decode `bytes`, derive the content id and store `<id>.jpg` under `dir`
///
/// The id is computed from the decoded image before any resizing, so it does
/// not depend on `compress_to`.
pub fn store_image(
    bytes: &[u8],
    url: &str,
    dir: &Path,
    compress_to: Option<(u32, u32)>,
) -> Result<StoredImage, ItemError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ItemError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let rgb = decoded.to_rgb8();
    let image_id = content_id(url, &rgb);

    let rgb = match compress_to {
        Some((width, height)) => imageops::resize(&rgb, width, height, FilterType::Lanczos3),
        None => rgb,
    };

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| ItemError::Encode(e.to_string()))?;

    let path = dir.join(format!("{image_id}.jpg"));
    write_atomic(&path, &encoded)?;

    Ok(StoredImage { image_id, path })
}
