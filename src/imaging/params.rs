//! Parameter types for image operations.
//!
//! These describe *what* to do, not *how*. They are the interface between
//! [`operations`](super::operations), which decides which files to touch
//! and whether to keep the result, and the [`backend`](super::backend),
//! which does the pixel work. The split lets tests swap in a mock backend.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`ImageKind`]: The formats that get re-encoded, detected by extension.
//! - [`OptimizeParams`]: Source file, its kind, and the quality to encode with.

use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Image formats the compressor re-encodes.
///
/// - JPEG: lossy, at the configured [`Quality`]
/// - PNG: lossless, best compression with adaptive filtering
/// - WebP: lossless
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageKind {
    /// Detect the kind from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

/// Parameters for re-encoding one image.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeParams {
    pub source: PathBuf,
    pub kind: ImageKind,
    pub quality: Quality,
}
