//! Image compression in pure Rust.
//!
//! | Kind | Encoding |
//! |---|---|
//! | **JPEG** | lossy re-encode at the configured quality |
//! | **PNG** | lossless, best compression, adaptive filter |
//! | **WebP** | lossless |
//! | GIF, SVG, other | skipped |
//!
//! Embedded ICC colour profiles are written back into every re-encode.
//! Animated PNG and WebP files are skipped: the encoders write one frame.
//!
//! The module is split into:
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`compress_in_place`], the keep-if-smaller policy

pub mod backend;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Encoding, ImageBackend};
pub use operations::{CompressOutcome, compress_in_place};
pub use params::{ImageKind, OptimizeParams, Quality};
pub use rust_backend::RustBackend;
