//! Pure Rust codec backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate |
//! | Decode (AVIF) | `avif-parse` (container) + `rav1d` (AV1 decode) + BT.601 YUV→RGB |
//! | Encode → JPEG / PNG | `image::codecs::{jpeg, png}` |
//! | Encode → WebP (lossy) | `webp` crate |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6), WebP fallback |

use super::backend::{BackendError, Encoded, ImageBackend};
use super::params::{EncodeParams, OutputFormat, Quality};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::sync::LazyLock;

/// Extensions whose `image` decoders are compiled in.
///
/// AVIF is not listed: the `image` crate's `"avif"` feature only enables the
/// encoder, and `ImageFormat::reading_enabled()` reports `true` for it anyway.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut exts: Vec<&'static str> = PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect();
    exts.push("avif");
    exts
});

/// Image file extensions that have a working decoder compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Production backend built on the `image` crate ecosystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

/// AVIF is detected by extension or by the `ftypavif` brand at offset 4.
fn is_avif(bytes: &[u8], extension: &str) -> bool {
    extension.eq_ignore_ascii_case("avif") || bytes.get(4..12) == Some(b"ftypavif".as_slice())
}

fn decode_generic(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()
        .map_err(|e| BackendError::ProcessingFailed(format!("decode failed: {e}")))
}

/// Decode AVIF bytes with avif-parse + rav1d.
fn decode_avif(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib as dav1d;
    use std::ptr::NonNull;

    let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::ProcessingFailed(format!("AVIF container: {e:?}")))?;
    let payload: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    // SAFETY: dav1d_default_settings fully initializes the struct it is given.
    let mut settings = unsafe {
        dav1d::dav1d_default_settings(NonNull::from(&mut settings).cast());
        settings.assume_init()
    };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    // SAFETY: ctx and settings outlive the call.
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::ProcessingFailed(format!("rav1d open: {}", rc.0)));
    }

    let mut data = Dav1dData::default();
    // SAFETY: data is a valid, default-initialized Dav1dData.
    let buf = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), payload.len()) };
    if buf.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::ProcessingFailed("rav1d data_create".into()));
    }
    // SAFETY: buf points at payload.len() writable bytes owned by data.
    unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), buf, payload.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(BackendError::ProcessingFailed(format!("rav1d send_data: {}", rc.0)));
    }

    // SAFETY: an all-zero Dav1dPicture is the documented "empty" state.
    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::ProcessingFailed(format!("rav1d get_picture: {}", rc.0)));
    }

    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let layout = pic.p.layout;
    let y_ptr = pic.data[0].map(|p| p.as_ptr() as *const u8);

    let subsampling = match layout {
        DAV1D_PIXEL_LAYOUT_I400 => Some((false, false)),
        DAV1D_PIXEL_LAYOUT_I420 => Some((true, true)),
        DAV1D_PIXEL_LAYOUT_I422 => Some((true, false)),
        DAV1D_PIXEL_LAYOUT_I444 => Some((false, false)),
        _ => None,
    };

    let rgb = match (y_ptr, subsampling) {
        (Some(y_ptr), Some((ss_x, ss_y))) => {
            let monochrome = layout == DAV1D_PIXEL_LAYOUT_I400;
            let chroma = |i: usize| {
                pic.data[i]
                    .map(|p| p.as_ptr() as *const u8)
                    .unwrap_or(y_ptr)
            };
            let planes = YuvPlanes {
                y_ptr,
                u_ptr: if monochrome { y_ptr } else { chroma(1) },
                v_ptr: if monochrome { y_ptr } else { chroma(2) },
                y_stride: pic.stride[0],
                uv_stride: if monochrome { 0 } else { pic.stride[1] },
                width,
                height,
                bpc: pic.p.bpc as u32,
                ss_x,
                ss_y,
                monochrome,
            };
            Ok(planes.to_rgb())
        }
        (None, _) => Err(BackendError::ProcessingFailed("AVIF has no luma plane".into())),
        (_, None) => Err(BackendError::ProcessingFailed(format!(
            "unsupported AVIF pixel layout: {layout}"
        ))),
    };

    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }

    image::RgbImage::from_raw(width, height, rgb?)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::ProcessingFailed("AVIF buffer size mismatch".into()))
}

/// Decoded YUV plane pointers from rav1d.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// Interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;
        let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;

        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);
        for row in 0..self.height {
            for col in 0..self.width {
                let y = self.sample(self.y_ptr, self.y_stride, col, row);
                if self.monochrome {
                    let v = to_u8(y);
                    rgb.extend_from_slice(&[v, v, v]);
                    continue;
                }
                let cx = if self.ss_x { col / 2 } else { col };
                let cy = if self.ss_y { row / 2 } else { row };
                let cb = self.sample(self.u_ptr, self.uv_stride, cx, cy) - center;
                let cr = self.sample(self.v_ptr, self.uv_stride, cx, cy) - center;
                rgb.extend_from_slice(&[
                    to_u8(y + 1.402 * cr),
                    to_u8(y - 0.344136 * cb - 0.714136 * cr),
                    to_u8(y + 1.772 * cb),
                ]);
            }
        }
        rgb
    }

    /// One plane sample; 10/12-bit planes are stored as u16.
    #[inline]
    fn sample(&self, ptr: *const u8, stride: isize, x: u32, y: u32) -> f32 {
        // SAFETY: x/y are within the plane and stride comes from the decoder.
        unsafe {
            if self.bpc <= 8 {
                *ptr.offset(y as isize * stride + x as isize) as f32
            } else {
                let offset = y as isize * stride + x as isize * 2;
                (ptr.offset(offset) as *const u16).read_unaligned() as f32
            }
        }
    }
}

fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

/// PNG is lossless; the quality hint has no effect.
fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_webp(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let (width, height) = (image.width(), image.height());
    let q = quality.value() as f32;
    let memory = if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_simple(false, q)
    } else {
        let rgb = image.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_simple(false, q)
    }
    .map_err(|e| {
        BackendError::ProcessingFailed(format!("WebP encode failed for {width}x{height}: {e:?}"))
    })?;
    Ok(memory.to_vec())
}

/// AVIF via rav1e at speed 6. `quality` is the already-lowered AVIF quality.
fn encode_avif(image: &DynamicImage, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
        &mut buf,
        6,
        quality.clamp(1, 100) as u8,
    );
    let pixels = if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };
    pixels
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("AVIF encode failed: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8], extension: &str) -> Result<DynamicImage, BackendError> {
        if is_avif(bytes, extension) {
            decode_avif(bytes)
        } else {
            decode_generic(bytes)
        }
    }

    fn encode(
        &self,
        image: &DynamicImage,
        params: &EncodeParams,
    ) -> Result<Encoded, BackendError> {
        let quality = params.quality;
        let (bytes, format) = match params.format {
            OutputFormat::Jpeg => (encode_jpeg(image, quality)?, OutputFormat::Jpeg),
            OutputFormat::Png => (encode_png(image)?, OutputFormat::Png),
            OutputFormat::WebP => (encode_webp(image, quality)?, OutputFormat::WebP),
            OutputFormat::Avif => {
                let avif_q = super::calculations::avif_quality(quality.value());
                match encode_avif(image, avif_q) {
                    Ok(bytes) => (bytes, OutputFormat::Avif),
                    Err(e) => {
                        tracing::warn!(error = %e, "AVIF encoding unavailable, writing WebP");
                        (encode_webp(image, quality)?, OutputFormat::WebP)
                    }
                }
            }
        };
        Ok(Encoded { bytes, format })
    }
}
