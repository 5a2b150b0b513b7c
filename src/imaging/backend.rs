//! Image encoding backend trait and shared types.
//!
//! The [`ImageBackend`] trait has a single operation: decode a source image
//! and return it re-encoded in the same format. Deciding whether the result
//! replaces the original is left to [`operations`](super::operations).
//!
//! Animated sources are reported as [`Encoding::Animated`] instead of being
//! re-encoded, since the encoders only write a single frame.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the pure-Rust
//! codecs of the `image` crate.

use super::params::OptimizeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// What a backend produced for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// The re-encoded file, same format, colour profile carried over.
    Encoded(Vec<u8>),
    /// The source has more than one frame and was not re-encoded.
    Animated,
}

/// Trait for image encoding backends.
///
/// `Sync` so one backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// Re-encode `params.source` as `params.kind`.
    fn encode(&self, params: &OptimizeParams) -> Result<Encoding, BackendError>;
}
