//! Shared test utilities for the putzfish test suite.
//!
//! Builds throwaway export bundles and small synthetic images, including
//! an animated PNG.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (tmp, input) = ExportBuilder::new()
//!     .file("index.html", r#"<link href="support/style.css">"#)
//!     .file("support/style.css", ".a { color: red }")
//!     .build();
//! // input  = <tmp>/site
//! // output = <tmp>/optimiert (derived, created by the copy stage)
//! ```

use image::{ImageEncoder, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the export directory inside the temp root.
pub const EXPORT_DIR: &str = "site";

// =========================================================================
// Export bundles
// =========================================================================

/// Builder for an export directory inside a fresh temp root.
///
/// The export lives one level down so the derived output directory is a
/// sibling inside the same temp root and is cleaned up with it.
#[derive(Default)]
pub struct ExportBuilder {
    files: Vec<(PathBuf, Vec<u8>)>,
}

impl ExportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file at `rel` (relative to the export root).
    pub fn file(mut self, rel: &str, content: impl AsRef<[u8]>) -> Self {
        self.files
            .push((PathBuf::from(rel), content.as_ref().to_vec()));
        self
    }

    /// Write everything to disk. Returns the temp root and the export path.
    pub fn build(self) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join(EXPORT_DIR);
        std::fs::create_dir_all(&input).unwrap();
        for (rel, content) in self.files {
            let path = input.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        (tmp, input)
    }
}

// =========================================================================
// Synthetic images
// =========================================================================

/// Write a gradient JPEG of the given size at the encoder's default quality.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Write an RGBA PNG with fast (weak) compression, leaving room to shrink.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 4 % 256) as u8, (y * 4 % 256) as u8, 200, 255])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    PngEncoder::new_with_quality(writer, CompressionType::Fast, FilterType::NoFilter)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
}

/// Write an APNG with `frames` full-size frames (distinct colours per frame).
///
/// The `image` crate cannot encode animation, so the still PNG it writes is
/// split into chunks and reassembled with `acTL`/`fcTL`/`fdAT` around its
/// image data.
pub fn write_test_apng(path: &Path, width: u32, height: u32, frames: u32) {
    use image::codecs::png::PngEncoder;
    let frame_data: Vec<Vec<u8>> = (0..frames)
        .map(|f| {
            let img = RgbaImage::from_fn(width, height, |x, y| {
                image::Rgba([(x * 3 + f * 80) as u8, (y * 5) as u8, (f * 60) as u8, 255])
            });
            let mut still = Vec::new();
            PngEncoder::new(&mut still)
                .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
                .unwrap();
            png_chunks(&still)
                .into_iter()
                .filter(|(kind, _)| kind == b"IDAT")
                .flat_map(|(_, data)| data)
                .collect()
        })
        .collect();

    let blank = vec![0u8; (width * height * 4) as usize];
    let mut header = Vec::new();
    PngEncoder::new(&mut header)
        .write_image(&blank, width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    let ihdr = png_chunks(&header)
        .into_iter()
        .find(|(kind, _)| kind == b"IHDR")
        .unwrap()
        .1;

    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    push_chunk(&mut out, b"IHDR", &ihdr);
    let mut actl = frames.to_be_bytes().to_vec();
    actl.extend_from_slice(&0u32.to_be_bytes());
    push_chunk(&mut out, b"acTL", &actl);

    let mut sequence = 0u32;
    for (index, data) in frame_data.iter().enumerate() {
        let mut fctl = Vec::with_capacity(26);
        fctl.extend_from_slice(&sequence.to_be_bytes());
        fctl.extend_from_slice(&width.to_be_bytes());
        fctl.extend_from_slice(&height.to_be_bytes());
        fctl.extend_from_slice(&0u32.to_be_bytes());
        fctl.extend_from_slice(&0u32.to_be_bytes());
        fctl.extend_from_slice(&1u16.to_be_bytes());
        fctl.extend_from_slice(&10u16.to_be_bytes());
        fctl.extend_from_slice(&[0, 0]);
        push_chunk(&mut out, b"fcTL", &fctl);
        sequence += 1;
        if index == 0 {
            push_chunk(&mut out, b"IDAT", data);
        } else {
            let mut fdat = sequence.to_be_bytes().to_vec();
            fdat.extend_from_slice(data);
            push_chunk(&mut out, b"fdAT", &fdat);
            sequence += 1;
        }
    }
    push_chunk(&mut out, b"IEND", &[]);
    std::fs::write(path, out).unwrap();
}

/// Split a PNG stream into (type, data) chunks.
fn png_chunks(png: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
    let mut chunks = Vec::new();
    let mut pos = 8;
    while pos + 8 <= png.len() {
        let len = u32::from_be_bytes(png[pos..pos + 4].try_into().unwrap()) as usize;
        let kind: [u8; 4] = png[pos + 4..pos + 8].try_into().unwrap();
        chunks.push((kind, png[pos + 8..pos + 8 + len].to_vec()));
        pos += 12 + len;
    }
    chunks
}

fn push_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc_input = kind.to_vec();
    crc_input.extend_from_slice(data);
    out.extend_from_slice(&crc32(&crc_input).to_be_bytes());
}

/// CRC-32 (IEEE) as used by PNG chunks.
fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}
