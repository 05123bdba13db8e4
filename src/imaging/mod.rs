//! Image processing: pure Rust decode, pixel work and encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image` (JPEG/PNG/TIFF/WebP), `avif-parse` + `rav1d` (AVIF) |
//! | **Orient / watermark / modulate** | `image::DynamicImage` + `imageops::overlay` |
//! | **Resize** | Lanczos3 (`resize_exact`) |
//! | **Encode** | `image` JPEG/PNG/AVIF (rav1e), `webp` for lossy WebP |
//! | **EXIF write** | `kamadak-exif` writer + `img-parts` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Pixel operations combining calculations + backend
//! - **EXIF block**: Output metadata policy

pub mod backend;
mod calculations;
pub mod exif_block;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Encoded, ImageBackend};
pub use calculations::{avif_quality, oriented_dimensions, watermark_dimensions};
pub use exif_block::{ExifBlock, ExifPolicy};
pub use operations::{
    apply_opacity, auto_orient, blur_data_url, composite_watermark, modulate, normalize,
    render_derivative,
};
pub use params::{BlurParams, EncodeParams, OutputFormat, Quality, WatermarkParams};
pub use rust_backend::{RustBackend, supported_input_extensions};
