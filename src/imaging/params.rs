//! Parameter types for image operations.
//!
//! These describe *what* to encode, not *how*. The [`backend`](super::backend)
//! turns them into bytes; the [`operations`](super::operations) module decides
//! which encodes happen.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`OutputFormat`]: Container/codec of a written file.
//! - [`EncodeParams`]: Format + quality for one encode.
//! - [`BlurParams`]: Placeholder bound and its color modulation.
//! - [`WatermarkParams`]: Watermark size ratio and opacity.

use std::fmt;

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
        Self(80)
    }
}

/// Output codec for a processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Avif,
}

impl OutputFormat {
    /// Output format for a source file extension.
    ///
    /// `store_as_webp` overrides everything. TIFF sources are re-encoded as
    /// JPEG since browsers can't display them. Returns `None` for extensions
    /// with no mapping.
    pub fn for_source(extension: &str, store_as_webp: bool) -> Option<Self> {
        if store_as_webp {
            return Some(Self::WebP);
        }
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "tif" | "tiff" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }

    /// Subtype used in `data:image/<subtype>;base64,` URLs.
    pub fn mime_subtype(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_subtype())
    }
}

/// Parameters for a single encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
}

/// Blur placeholder settings. A `size` of 0 disables the placeholder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParams {
    pub size: u32,
    pub saturation: f64,
    pub brightness: f64,
}

/// Watermark box size and translucency, both in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkParams {
    pub ratio: f64,
    pub opacity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }

    #[test]
    fn source_extension_mapping_is_case_insensitive() {
        assert_eq!(OutputFormat::for_source("JPG", false), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::for_source("jpeg", false), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::for_source("Png", false), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::for_source("avif", false), Some(OutputFormat::Avif));
        assert_eq!(OutputFormat::for_source("gif", false), None);
    }

    #[test]
    fn store_as_webp_overrides_source_format() {
        assert_eq!(OutputFormat::for_source("png", true), Some(OutputFormat::WebP));
        assert_eq!(OutputFormat::for_source("avif", true), Some(OutputFormat::WebP));
    }

    #[test]
    fn jpeg_is_written_as_jpg() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Jpeg.mime_subtype(), "jpeg");
    }
}
