//! High-level image operations.
//!
//! These functions combine calculations with pixel work and backend encodes.
//! All of them are pure with respect to their input image: each returns a new
//! image or encoded buffer, so one decoded source can feed every derivative.

use super::backend::{BackendError, Encoded, ImageBackend};
use super::calculations::{
    derivative_height, fit_inside, watermark_dimensions, watermark_position,
};
use super::params::{BlurParams, EncodeParams, WatermarkParams};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Rotate/flip pixels so the image displays upright, per EXIF orientation.
///
/// After this the orientation tag is meaningless and must not be written out.
pub fn auto_orient(image: DynamicImage, orientation: Option<u32>) -> DynamicImage {
    match orientation {
        Some(2) => image.fliph(),
        Some(3) => image.rotate180(),
        Some(4) => image.flipv(),
        Some(5) => image.rotate90().fliph(),
        Some(6) => image.rotate90(),
        Some(7) => image.rotate270().fliph(),
        Some(8) => image.rotate270(),
        _ => image,
    }
}

/// Scale color saturation and brightness.
///
/// Saturation mixes each channel with the pixel's luma: 0 is grayscale, 1 is
/// unchanged, above 1 boosts. Brightness multiplies all color channels.
/// Alpha is untouched.
pub fn modulate(image: &DynamicImage, saturation: f64, brightness: f64) -> DynamicImage {
    if saturation == 1.0 && brightness == 1.0 {
        return image.clone();
    }
    let mut rgba = image.to_rgba8();
    for Rgba([r, g, b, _]) in rgba.pixels_mut() {
        let (rf, gf, bf) = (*r as f64, *g as f64, *b as f64);
        let luma = 0.2126 * rf + 0.7152 * gf + 0.0722 * bf;
        let adjust = |c: f64| ((luma + saturation * (c - luma)) * brightness).clamp(0.0, 255.0);
        *r = adjust(rf).round() as u8;
        *g = adjust(gf).round() as u8;
        *b = adjust(bf).round() as u8;
    }
    restore_layout(image, rgba)
}

/// Stretch each color channel to the full 0-255 range.
pub fn normalize(image: &DynamicImage) -> DynamicImage {
    let mut rgba = image.to_rgba8();
    let mut lo = [u8::MAX; 3];
    let mut hi = [u8::MIN; 3];
    for px in rgba.pixels() {
        for c in 0..3 {
            lo[c] = lo[c].min(px[c]);
            hi[c] = hi[c].max(px[c]);
        }
    }
    for px in rgba.pixels_mut() {
        for c in 0..3 {
            let span = hi[c].saturating_sub(lo[c]);
            if span > 0 {
                let v = (px[c] - lo[c]) as u32 * 255 / span as u32;
                px[c] = v as u8;
            }
        }
    }
    restore_layout(image, rgba)
}

/// Scale every pixel's alpha by `opacity` (destination-in against a uniform
/// `floor(255 * opacity)` alpha layer). Transparent pixels stay transparent.
pub fn apply_opacity(mark: &mut RgbaImage, opacity: f64) {
    let layer_alpha = (255.0 * opacity).floor().clamp(0.0, 255.0) as u32;
    for px in mark.pixels_mut() {
        px[3] = ((px[3] as u32 * layer_alpha + 127) / 255) as u8;
    }
}

/// Composite `mark` onto the bottom-right of `image`.
///
/// `mark` must already be orientation-normalized; its box is computed from
/// both images' shapes and `params.ratio`, and its alpha scaled by
/// `params.opacity`.
pub fn composite_watermark(
    image: &DynamicImage,
    mark: &DynamicImage,
    params: &WatermarkParams,
) -> DynamicImage {
    let (ww, hh) = watermark_dimensions(
        image.height(),
        image.width(),
        mark.height(),
        mark.width(),
        params.ratio,
    );
    if ww == 0 || hh == 0 {
        tracing::debug!(ww, hh, "watermark box is empty, skipping");
        return image.clone();
    }

    let mut resized = mark.resize_to_fill(ww, hh, FilterType::Lanczos3).to_rgba8();
    apply_opacity(&mut resized, params.opacity);

    let (left, top) = watermark_position(image.width(), image.height(), ww, hh);
    let mut canvas = image.to_rgba8();
    imageops::overlay(&mut canvas, &resized, left, top);
    restore_layout(image, canvas)
}

/// Resize to `width` (height follows the aspect ratio) and encode.
pub fn render_derivative(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    width: u32,
    params: &EncodeParams,
) -> Result<Encoded> {
    let height = derivative_height(image.width(), image.height(), width);
    let resized = image.resize_exact(width, height, FilterType::Lanczos3);
    backend.encode(&resized, params)
}

/// Encode a tiny placeholder as a `data:image/<subtype>;base64,...` URL.
///
/// Returns `None` when the placeholder is disabled (`size == 0`).
pub fn blur_data_url(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    blur: &BlurParams,
    params: &EncodeParams,
) -> Result<Option<String>> {
    if blur.size == 0 {
        return Ok(None);
    }
    let (w, h) = fit_inside(image.width(), image.height(), blur.size);
    let small = image.resize_exact(w, h, FilterType::Triangle);
    let small = modulate(&normalize(&small), blur.saturation, blur.brightness);
    let flattened = DynamicImage::ImageRgb8(small.to_rgb8());

    let encoded = backend.encode(&flattened, params)?;
    Ok(Some(format!(
        "data:image/{};base64,{}",
        encoded.format.mime_subtype(),
        STANDARD.encode(&encoded.bytes)
    )))
}

/// Hand back an RGBA working buffer in the source's channel layout.
fn restore_layout(source: &DynamicImage, rgba: RgbaImage) -> DynamicImage {
    let out = DynamicImage::ImageRgba8(rgba);
    if source.color().has_alpha() {
        out
    } else {
        DynamicImage::ImageRgb8(out.to_rgb8())
    }
}
