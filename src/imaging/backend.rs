//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait covers the two operations that touch codecs:
//! decoding source bytes into pixels and encoding pixels into an output
//! format. Everything between (orientation, watermarking, modulation,
//! resizing) is plain pixel work in [`operations`](super::operations).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{EncodeParams, OutputFormat};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an encode: the bytes and the format they are actually in.
///
/// The format can differ from the requested one when the backend falls back
/// (AVIF → WebP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// Trait for image codec backends.
pub trait ImageBackend: Sync {
    /// Decode a source file's bytes. `extension` is the source file extension,
    /// used for containers the generic sniffing can't handle.
    fn decode(&self, bytes: &[u8], extension: &str) -> Result<DynamicImage, BackendError>;

    /// Encode pixels with the given format and quality.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams)
    -> Result<Encoded, BackendError>;
}
