//! Pure Rust image backend on the `image` crate.
//!
//! ## Codec mapping
//!
//! | Kind | Decode | Encode |
//! |---|---|---|
//! | JPEG | `JpegDecoder` | `JpegEncoder::new_with_quality` (lossy) |
//! | PNG | `PngDecoder` | `PngEncoder`, `CompressionType::Best`, adaptive filter |
//! | WebP | `WebPDecoder` | `WebPEncoder::new_lossless` |
//!
//! The EXIF orientation of the source is baked into the pixels before
//! encoding, since the encoders write no EXIF block. The ICC profile is
//! read from the source and handed to the encoder unchanged.
//!
//! APNG and animated WebP sources are detected from their headers and
//! returned as [`Encoding::Animated`] without decoding any frame.

use super::backend::{BackendError, Encoding, ImageBackend};
use super::params::{ImageKind, OptimizeParams};
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::codecs::png::{CompressionType, FilterType, PngDecoder, PngEncoder};
use image::codecs::webp::{WebPDecoder, WebPEncoder};
use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageError, ImageResult};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the codec mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded still image and the colour profile it was stored with.
struct Still {
    image: DynamicImage,
    icc_profile: Option<Vec<u8>>,
}

/// Decode `bytes` as `kind`. `None` for animated sources.
fn decode(bytes: &[u8], kind: ImageKind) -> ImageResult<Option<Still>> {
    let cursor = Cursor::new(bytes);
    match kind {
        ImageKind::Jpeg => read_still(JpegDecoder::new(cursor)?).map(Some),
        ImageKind::Png => {
            let decoder = PngDecoder::new(cursor)?;
            if decoder.is_apng()? {
                return Ok(None);
            }
            read_still(decoder).map(Some)
        }
        ImageKind::WebP => {
            let decoder = WebPDecoder::new(cursor)?;
            if decoder.has_animation() {
                return Ok(None);
            }
            read_still(decoder).map(Some)
        }
    }
}

fn read_still(mut decoder: impl ImageDecoder) -> ImageResult<Still> {
    let icc_profile = decoder.icc_profile()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(Still { image, icc_profile })
}

fn attach_icc(encoder: &mut impl ImageEncoder, icc_profile: Option<Vec<u8>>) -> ImageResult<()> {
    if let Some(profile) = icc_profile {
        encoder
            .set_icc_profile(profile)
            .map_err(ImageError::Unsupported)?;
    }
    Ok(())
}

fn encode_jpeg(still: Still, quality: u8) -> ImageResult<Vec<u8>> {
    // JPEG has no alpha channel; grayscale stays single-channel.
    let img = match still.image {
        img @ DynamicImage::ImageLuma8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    attach_icc(&mut encoder, still.icc_profile)?;
    img.write_with_encoder(encoder)?;
    Ok(buf)
}

fn encode_png(still: Still) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    attach_icc(&mut encoder, still.icc_profile)?;
    still.image.write_with_encoder(encoder)?;
    Ok(buf)
}

fn encode_webp(still: Still) -> ImageResult<Vec<u8>> {
    // The lossless WebP encoder takes 8-bit RGB(A) only.
    let img = if still.image.color().has_alpha() {
        DynamicImage::ImageRgba8(still.image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(still.image.to_rgb8())
    };
    let mut buf = Vec::new();
    let mut encoder = WebPEncoder::new_lossless(&mut buf);
    attach_icc(&mut encoder, still.icc_profile)?;
    img.write_with_encoder(encoder)?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn encode(&self, params: &OptimizeParams) -> Result<Encoding, BackendError> {
        let bytes = std::fs::read(&params.source).map_err(BackendError::Io)?;
        let still = decode(&bytes, params.kind).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to decode {}: {}",
                params.source.display(),
                e
            ))
        })?;
        let Some(still) = still else {
            return Ok(Encoding::Animated);
        };
        let encoded = match params.kind {
            ImageKind::Jpeg => encode_jpeg(still, params.quality.value() as u8),
            ImageKind::Png => encode_png(still),
            ImageKind::WebP => encode_webp(still),
        };
        encoded.map(Encoding::Encoded).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to encode {}: {}",
                params.source.display(),
                e
            ))
        })
    }
}
