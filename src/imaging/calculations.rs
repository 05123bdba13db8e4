//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

/// Pixel dimensions after EXIF orientation normalization.
///
/// Orientation tags 5–8 describe a 90° rotation, so the visually correct
/// image has width and height swapped. Tags 1–4 (and a missing tag) keep
/// the raw dimensions.
///
/// ```
/// # use slideprep::imaging::oriented_dimensions;
/// assert_eq!(oriented_dimensions(2000, 1000, Some(6)), (1000, 2000));
/// assert_eq!(oriented_dimensions(2000, 1000, Some(3)), (2000, 1000));
/// assert_eq!(oriented_dimensions(2000, 1000, None), (2000, 1000));
/// ```
pub fn oriented_dimensions(width: u32, height: u32, orientation: Option<u32>) -> (u32, u32) {
    match orientation {
        Some(tag) if tag > 4 => (height, width),
        _ => (width, height),
    }
}

/// Size of the watermark box for a main image, as `(width, height)`.
///
/// # Arguments
/// * `main_height`, `main_width` - Oriented main image dimensions (H, W)
/// * `mark_height`, `mark_width` - Oriented watermark dimensions (h, w)
/// * `ratio` - Share of the main image the mark occupies, in `(0, 1]`
///
/// The branch is chosen by the shapes of the main image and the mark:
///
/// | main | mark | box |
/// |---|---|---|
/// | tall (H > W) | wide or square (w ≥ h) | `ww = ratio·H`, `hh = ww/w·h` |
/// | wide (H < W) | tall or square (w ≤ h) | `hh = ratio·H`, `ww = hh/h·w` |
/// | tall (H > W) | tall (w < h) | `hh = ratio·H`, `ww = hh/h·h` |
/// | anything else | | `ww = ratio·W`, `hh = ww/w·h` |
///
/// The tall/tall row yields a square box (`ww == hh`). Published galleries
/// were rendered with it, so it is kept as is.
pub fn watermark_dimensions(
    main_height: u32,
    main_width: u32,
    mark_height: u32,
    mark_width: u32,
    ratio: f64,
) -> (u32, u32) {
    let (big_h, big_w) = (main_height as f64, main_width as f64);
    let (h, w) = (mark_height as f64, mark_width as f64);

    let (ww, hh) = if big_h > big_w && w >= h {
        let ww = ratio * big_h;
        (ww, ww / w * h)
    } else if big_h < big_w && w <= h {
        let hh = ratio * big_h;
        (hh / h * w, hh)
    } else if big_h > big_w && w <= h {
        let hh = ratio * big_h;
        (hh / h * h, hh)
    } else {
        let ww = ratio * big_w;
        (ww, ww / w * h)
    };

    (ww.floor() as u32, hh.floor() as u32)
}

/// Top-left corner of the watermark, as `(left, top)`.
///
/// The mark is anchored bottom-right with a margin proportional to its own
/// height. Coordinates may be negative when the mark is larger than the
/// image; compositing clips them.
pub fn watermark_position(
    main_width: u32,
    main_height: u32,
    mark_width: u32,
    mark_height: u32,
) -> (i64, i64) {
    let mark_w = mark_width as f64;
    let mark_h = mark_height as f64;
    let top = main_height as i64 - (1.5 * mark_h).floor() as i64;
    let left = main_width as i64 - (mark_w + 0.5 * mark_h).floor() as i64;
    (left, top)
}

/// Height of a derivative resized to `target_width`, preserving aspect ratio.
pub fn derivative_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = height as f64 * target_width as f64 / width as f64;
    (scaled.round() as u32).max(1)
}

/// Dimensions that fit inside a `bound`×`bound` square, preserving aspect ratio.
pub fn fit_inside(width: u32, height: u32, bound: u32) -> (u32, u32) {
    let scale = (bound as f64 / width as f64).min(bound as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// AVIF quality for a nominal quality: 15 points lower, floored at 0.
///
/// AVIF at the same nominal quality as JPEG/WebP produces much larger files
/// for no visible gain.
pub fn avif_quality(quality: u32) -> u32 {
    quality.saturating_sub(15)
}
