//! # slideprep
//!
//! Prepares photo galleries for a statically generated photoblog. Each post
//! with a matching photo directory is a gallery; its source photos become
//! published images, resized derivatives, blur placeholders and one
//! `manifest.json` the site renders from.
//!
//! # Architecture: Two Stages
//!
//! ```text
//! 1. Scan     posts + photos/  →  RunPlan           (galleries, pending files)
//! 2. Process  RunPlan          →  public/images/    (images + manifest.json)
//! ```
//!
//! The scan stage is cheap and side-effect free, so `slideprep check` can
//! show exactly what a run would do. The process stage flushes each
//! gallery's manifest after every file, so an interrupted run resumes where
//! it stopped.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Stage 1: discovers galleries and diffs sources against manifests |
//! | [`process`] | Stage 2: per-image pipeline, derivatives, uploads, manifest flushes |
//! | [`config`] | `slideprep.toml` loading, merging over stock defaults, validation |
//! | [`frontmatter`] | `+++` TOML front matter and per-gallery processing options |
//! | [`manifest`] | The per-gallery JSON manifest and its records |
//! | [`metadata`] | EXIF reading: orientation, capture time, GPS |
//! | [`geo`] | Offline reverse geocoding of GPS coordinates |
//! | [`imaging`] | Pure-Rust decode, pixel operations, encode, EXIF writing |
//! | [`upload`] | Cloudinary upload sink and delivery URLs |
//! | [`progress`] | Progress bar and log routing around it |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Manifest Keys Are the Source of Truth
//!
//! A source file is done exactly when its filename is a key in the gallery
//! manifest. Failed files are never recorded, so the next run retries them
//! and nothing else. `--rebuild` starts every manifest from empty.
//!
//! ## One Decode per Source
//!
//! Each source is decoded, oriented, watermarked and modulated once. Every
//! output (primary, placeholder, derivatives) is rendered from that image by
//! pure functions, so derivative widths encode in parallel.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling),
//! `rav1e`/`rav1d` for AVIF and `webp` for lossy WebP. No ImageMagick, no
//! libvips: the binary has no system dependencies.
//!
//! ## Options at the Boundary
//!
//! Post authors write loose booleans (`"no"`, `0`, `false`). They are parsed
//! once in [`frontmatter`] into plain `bool`s; the pipeline never sees the
//! raw values.

pub mod config;
pub mod frontmatter;
pub mod geo;
pub mod imaging;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod process;
pub mod progress;
pub mod scan;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;
