//! Site configuration module.
//!
//! Handles loading, validating, and merging `slideprep.toml`. Stock defaults
//! are serialized to a TOML table, the user's file is merged on top of it, and
//! the result is deserialized with unknown keys rejected.
//!
//! ## Config File Location
//!
//! `slideprep.toml` lives in the project root, next to the posts and photos:
//!
//! ```text
//! blog/
//! ├── slideprep.toml
//! ├── content/posts/iceland.md   # front matter selects per-gallery options
//! ├── photos/iceland/            # gallery sources
//! └── public/images/iceland/     # outputs + manifest.json
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [layout]
//! posts_dir = "content/posts"
//! photos_dir = "photos"
//! public_dir = "public"
//! images_dir = "images"     # under public_dir
//! resized_dir = "resized"   # under each gallery output
//! url_prefix = "/images"
//!
//! [images]
//! quality = 80
//! store_as_webp = false
//! saturation = 1.0
//! blur_width = 10
//! image_sizes = [16, 32, 48, 64, 96, 128, 256, 384]
//! device_sizes = [640, 750, 828, 1080, 1200, 1920, 2048, 3840]
//! extensions = ["jpg", "jpeg", "webp", "png", "avif"]
//!
//! [blur]
//! size = 10                 # 0 disables placeholders
//! saturation = 1.2
//! brightness = 1.0
//!
//! [watermark]
//! file = "watermark.png"    # optional, relative to the project root
//! size_ratio = 0.1
//! opacity = 0.5
//!
//! [processing]
//! max_processes = 4         # omit for auto = CPU cores
//! parallel_files = false
//!
//! [cloudinary]
//! cloud_name = "demo"
//! api_key = "1234"
//! folder = "blog"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{BlurParams, Quality, WatermarkParams, supported_input_extensions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file in the project root.
pub const CONFIG_FILE: &str = "slideprep.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("watermark.size_ratio must be in (0, 1], got {0}")]
    InvalidWatermarkRatio(f64),
    #[error("watermark.opacity must be in (0, 1], got {0}")]
    InvalidWatermarkOpacity(f64),
}

/// Site configuration loaded from `slideprep.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Where posts, sources and outputs live.
    pub layout: LayoutConfig,
    /// Encoding and derivative widths.
    pub images: ImagesConfig,
    /// Blur placeholder settings.
    pub blur: BlurConfig,
    /// Optional watermark overlay.
    pub watermark: WatermarkConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Cloudinary account for the `cloudinary` loader.
    pub cloudinary: CloudinaryConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    ///
    /// Watermark bounds are checked first so they surface as their own error
    /// kinds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.watermark.size_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidWatermarkRatio(ratio));
        }
        let opacity = self.watermark.opacity;
        if !(opacity > 0.0 && opacity <= 1.0) {
            return Err(ConfigError::InvalidWatermarkOpacity(opacity));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.saturation < 0.0 {
            return Err(ConfigError::Validation(
                "images.saturation must not be negative".into(),
            ));
        }
        if self.blur.saturation < 0.0 || self.blur.brightness < 0.0 {
            return Err(ConfigError::Validation(
                "blur.saturation and blur.brightness must not be negative".into(),
            ));
        }
        if self.images.image_sizes.is_empty() && self.images.device_sizes.is_empty() {
            return Err(ConfigError::Validation(
                "images.image_sizes and images.device_sizes must not both be empty".into(),
            ));
        }
        if self.widths().contains(&0) {
            return Err(ConfigError::Validation(
                "image widths must be greater than zero".into(),
            ));
        }
        if self.images.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "images.extensions must not be empty".into(),
            ));
        }
        let supported = supported_input_extensions();
        if let Some(ext) = self
            .images
            .extensions
            .iter()
            .find(|e| !supported.contains(&e.to_ascii_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "images.extensions: no decoder for \"{ext}\""
            )));
        }
        Ok(())
    }

    /// Derivative widths for a run: the blur width, then image sizes, then
    /// device sizes. Repeated widths keep their first position only.
    pub fn widths(&self) -> Vec<u32> {
        let mut widths = Vec::new();
        let all = std::iter::once(self.images.blur_width)
            .chain(self.images.image_sizes.iter().copied())
            .chain(self.images.device_sizes.iter().copied());
        for w in all {
            if !widths.contains(&w) {
                widths.push(w);
            }
        }
        widths
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.images.quality)
    }

    pub fn blur_params(&self) -> BlurParams {
        BlurParams {
            size: self.blur.size,
            saturation: self.blur.saturation,
            brightness: self.blur.brightness,
        }
    }

    pub fn watermark_params(&self) -> WatermarkParams {
        WatermarkParams {
            ratio: self.watermark.size_ratio,
            opacity: self.watermark.opacity,
        }
    }

    /// Absolute watermark path, if one is configured.
    pub fn watermark_path(&self, root: &Path) -> Option<PathBuf> {
        self.watermark.file.as_ref().map(|f| root.join(f))
    }
}

/// Directory layout of a project, relative to its root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Markdown posts with `+++` front matter.
    pub posts_dir: String,
    /// One source directory per gallery slug.
    pub photos_dir: String,
    /// Static hosting root. Its absence only warns.
    pub public_dir: String,
    /// Gallery outputs, under `public_dir`.
    pub images_dir: String,
    /// Derivatives, under each gallery output.
    pub resized_dir: String,
    /// URL path that maps to `public_dir/images_dir`.
    pub url_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            posts_dir: "content/posts".to_string(),
            photos_dir: "photos".to_string(),
            public_dir: "public".to_string(),
            images_dir: "images".to_string(),
            resized_dir: "resized".to_string(),
            url_prefix: "/images".to_string(),
        }
    }
}

impl LayoutConfig {
    pub fn posts_path(&self, root: &Path) -> PathBuf {
        root.join(&self.posts_dir)
    }

    pub fn public_path(&self, root: &Path) -> PathBuf {
        root.join(&self.public_dir)
    }

    pub fn source_path(&self, root: &Path, slug: &str) -> PathBuf {
        root.join(&self.photos_dir).join(slug)
    }

    pub fn output_path(&self, root: &Path, slug: &str) -> PathBuf {
        self.public_path(root).join(&self.images_dir).join(slug)
    }

    /// Public URL of a derivative file.
    pub fn derivative_url(&self, slug: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.url_prefix.trim_end_matches('/'),
            slug,
            self.resized_dir,
            file_name
        )
    }
}

/// Encoding and derivative width settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Lossy encoding quality (1-100). AVIF uses 15 less.
    pub quality: u32,
    /// Write every output as WebP regardless of the source format.
    pub store_as_webp: bool,
    /// Saturation multiplier for the primary image and derivatives.
    pub saturation: f64,
    /// First derivative width, used by placeholders.
    pub blur_width: u32,
    /// Small widths for fixed-size layouts.
    pub image_sizes: Vec<u32>,
    /// Widths matching common device viewports.
    pub device_sizes: Vec<u32>,
    /// Source extensions to pick up (case-insensitive).
    pub extensions: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            store_as_webp: false,
            saturation: 1.0,
            blur_width: 10,
            image_sizes: vec![16, 32, 48, 64, 96, 128, 256, 384],
            device_sizes: vec![640, 750, 828, 1080, 1200, 1920, 2048, 3840],
            extensions: ["jpg", "jpeg", "webp", "png", "avif"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Blur placeholder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlurConfig {
    /// Bounding square of the placeholder in pixels. 0 disables it.
    pub size: u32,
    pub saturation: f64,
    pub brightness: f64,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            size: 10,
            saturation: 1.2,
            brightness: 1.0,
        }
    }
}

/// Watermark overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    /// Watermark image, relative to the project root. No watermark when absent.
    pub file: Option<String>,
    /// Share of the main image the mark occupies, in `(0, 1]`.
    pub size_ratio: f64,
    /// Opacity of the mark, in `(0, 1]`.
    pub opacity: f64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            file: None,
            size_ratio: 0.1,
            opacity: 0.5,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Process files of a gallery in parallel instead of one at a time.
    pub parallel_files: bool,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Cloudinary account settings. The API secret is never read from this file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudinaryConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    /// Folder prefix; each gallery uploads into `<folder>/<slug>`.
    pub folder: Option<String>,
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `slideprep.toml` from a project root as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist, `Err` if it is invalid TOML.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the project config: user values over stock defaults, validated.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `slideprep.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# slideprep configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Project layout (relative to the project root)
# ---------------------------------------------------------------------------
[layout]
# Markdown posts; each post's +++ front matter configures its gallery.
posts_dir = "content/posts"

# Gallery sources: one directory per post slug, e.g. photos/iceland/.
photos_dir = "photos"

# Static hosting root. A missing directory only produces a warning.
public_dir = "public"

# Gallery outputs go to <public_dir>/<images_dir>/<slug>/.
images_dir = "images"

# Resized derivatives go to this subdirectory of each gallery output.
resized_dir = "resized"

# URL path under which <public_dir>/<images_dir> is served.
url_prefix = "/images"

# ---------------------------------------------------------------------------
# Encoding and derivative widths
# ---------------------------------------------------------------------------
[images]
# Lossy encoding quality (1 = worst, 100 = best). AVIF output uses 15 less.
quality = 80

# Write every output as WebP instead of the source format.
store_as_webp = false

# Saturation multiplier (1.0 = unchanged).
saturation = 1.0

# Widths generated per image: blur_width, then image_sizes, then device_sizes.
blur_width = 10
image_sizes = [16, 32, 48, 64, 96, 128, 256, 384]
device_sizes = [640, 750, 828, 1080, 1200, 1920, 2048, 3840]

# Source file extensions to process (case-insensitive).
extensions = ["jpg", "jpeg", "webp", "png", "avif"]

# ---------------------------------------------------------------------------
# Blur placeholders (inline data URLs in the manifest)
# ---------------------------------------------------------------------------
[blur]
# Bounding square in pixels. 0 disables placeholders.
size = 10
saturation = 1.2
brightness = 1.0

# ---------------------------------------------------------------------------
# Watermark
# ---------------------------------------------------------------------------
[watermark]
# Watermark image relative to the project root. Omit for no watermark.
# file = "watermark.png"

# Share of the main image the mark occupies, in (0, 1].
size_ratio = 0.1

# Opacity of the mark, in (0, 1].
opacity = 0.5

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_processes = 4

# Process the files of a gallery in parallel. Widths are always parallel.
parallel_files = false

# ---------------------------------------------------------------------------
# Cloudinary (used by posts with loader = "cloudinary")
# ---------------------------------------------------------------------------
# The API secret is read from the CLOUDINARY_API_SECRET environment variable.
[cloudinary]
# cloud_name = "demo"
# api_key = "123456789012345"
# folder = "blog"
"##
}
