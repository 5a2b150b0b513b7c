//! High-level image operations.
//!
//! [`compress_in_place`] re-encodes one file through a backend and replaces
//! the original only when the result is strictly smaller, so compressing
//! never grows an image and an already-optimal file keeps its exact bytes.

use super::backend::{BackendError, Encoding, ImageBackend};
use super::params::{ImageKind, OptimizeParams, Quality};
use std::fs;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// What happened to one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressOutcome {
    /// Overwritten with a smaller encoding.
    Reduced { before: u64, after: u64 },
    /// Re-encoding did not help; file untouched.
    Kept { size: u64 },
    /// Not a format the compressor handles; file untouched.
    Unsupported,
    /// Animated image; file untouched.
    Animated,
}

/// Compress `path` in place if that makes it smaller.
///
/// The replacement is written to a temporary sibling first and renamed over
/// the original.
pub fn compress_in_place(
    backend: &impl ImageBackend,
    path: &Path,
    quality: Quality,
) -> Result<CompressOutcome> {
    let Some(kind) = ImageKind::from_path(path) else {
        return Ok(CompressOutcome::Unsupported);
    };
    let before = fs::metadata(path)?.len();
    let encoded = match backend.encode(&OptimizeParams {
        source: path.to_path_buf(),
        kind,
        quality,
    })? {
        Encoding::Encoded(bytes) => bytes,
        Encoding::Animated => return Ok(CompressOutcome::Animated),
    };
    let after = encoded.len() as u64;
    if after >= before {
        return Ok(CompressOutcome::Kept { size: before });
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".putzfish-tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, &encoded)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(CompressOutcome::Reduced { before, after })
}
