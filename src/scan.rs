//! Gallery discovery and work planning.
//!
//! A gallery is a post with a matching photo directory. The scanner pairs
//! them up, reads each post's front matter into [`ProcessingOptions`], and
//! diffs each gallery's source directory against its manifest to find the
//! files that still need work.
//!
//! ## Project Layout
//!
//! ```text
//! blog/
//! ├── slideprep.toml               # optional
//! ├── content/posts/
//! │   ├── iceland.md               # +++ front matter +++, slug = "iceland"
//! │   └── notes.md                 # no photos/notes/ → not a gallery
//! ├── photos/
//! │   └── iceland/
//! │       ├── dawn.JPG
//! │       └── glacier.png
//! └── public/images/iceland/       # created on first run
//!     ├── manifest.json
//!     ├── dawn.jpg
//!     └── resized/dawn-w640.jpg
//! ```
//!
//! The slug is the front-matter `slug`, or the post's file stem.

use crate::config::SiteConfig;
use crate::frontmatter::{FrontMatterError, ProcessingOptions, parse_front_matter};
use crate::manifest::{Manifest, ManifestError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid front matter in {path}: {source}")]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },
    #[error("No gallery named \"{0}\"")]
    UnknownGallery(String),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// A post with photos.
#[derive(Debug, Clone, PartialEq)]
pub struct Gallery {
    pub slug: String,
    pub title: Option<String>,
    pub post_path: PathBuf,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub options: ProcessingOptions,
}

/// A gallery with its loaded manifest and pending files.
#[derive(Debug)]
pub struct GalleryWork {
    pub gallery: Gallery,
    pub manifest: Manifest,
    /// Source filenames to process, sorted.
    pub files: Vec<String>,
    /// Matching source files already in the manifest.
    pub skipped: usize,
}

/// Everything a run will do.
#[derive(Debug)]
pub struct RunPlan {
    pub galleries: Vec<GalleryWork>,
    /// Files to process across all galleries.
    pub image_count: usize,
    /// Progress units: one per derivative of each file.
    pub total_units: u64,
    /// Manifests were discarded and every file is work.
    pub rebuild: bool,
}

/// Whether the hosting directory exists. A missing one is only warned about.
pub fn check_project_root(root: &Path, config: &SiteConfig) -> bool {
    let public = config.layout.public_path(root);
    let found = public.is_dir();
    if !found {
        tracing::warn!(
            path = %public.display(),
            "public directory not found; is this a blog project root?"
        );
    }
    found
}

/// Find galleries: posts whose slug has a photo directory.
///
/// A non-empty `filter` restricts the result to those slugs, and every
/// requested slug must exist.
pub fn discover_galleries(
    root: &Path,
    config: &SiteConfig,
    filter: &[String],
) -> Result<Vec<Gallery>, ScanError> {
    let posts_dir = config.layout.posts_path(root);
    if !posts_dir.is_dir() {
        tracing::warn!(path = %posts_dir.display(), "posts directory not found");
        return match filter.first() {
            Some(slug) => Err(ScanError::UnknownGallery(slug.clone())),
            None => Ok(Vec::new()),
        };
    }

    let mut galleries = Vec::new();
    for entry in WalkDir::new(&posts_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !has_extension(path, &["md", "markdown"]) {
            continue;
        }

        let text = fs::read_to_string(path)?;
        let front = parse_front_matter(&text).map_err(|source| ScanError::FrontMatter {
            path: path.to_path_buf(),
            source,
        })?;
        let Some(slug) = front
            .slug
            .clone()
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        else {
            continue;
        };

        let source_dir = config.layout.source_path(root, &slug);
        if !source_dir.is_dir() {
            tracing::debug!(slug, "post has no photo directory");
            continue;
        }

        galleries.push(Gallery {
            output_dir: config.layout.output_path(root, &slug),
            options: front.processing_options(),
            title: front.title,
            post_path: path.to_path_buf(),
            source_dir,
            slug,
        });
    }

    if filter.is_empty() {
        return Ok(galleries);
    }
    if let Some(missing) = filter.iter().find(|s| !galleries.iter().any(|g| &g.slug == *s)) {
        return Err(ScanError::UnknownGallery(missing.clone()));
    }
    galleries.retain(|g| filter.contains(&g.slug));
    Ok(galleries)
}

/// Case-insensitive extension check.
fn has_extension(path: &Path, allowed: &[impl AsRef<str>]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.as_ref().eq_ignore_ascii_case(ext)))
}

/// Source images in a gallery directory, sorted by filename.
pub fn list_sources(source_dir: &Path, extensions: &[String]) -> Result<Vec<String>, ScanError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(source_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !has_extension(&path, extensions) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.push(name.to_string());
        } else {
            tracing::warn!(path = %path.display(), "skipping non UTF-8 filename");
        }
    }
    files.sort();
    Ok(files)
}

/// Files of a gallery that are not yet in its manifest.
///
/// Returns `(pending, skipped)`.
pub fn compute_work(
    gallery: &Gallery,
    manifest: &Manifest,
    extensions: &[String],
) -> Result<(Vec<String>, usize), ScanError> {
    let (pending, done): (Vec<String>, Vec<String>) = list_sources(&gallery.source_dir, extensions)?
        .into_iter()
        .partition(|name| !manifest.contains(name));
    Ok((pending, done.len()))
}

/// Load manifests and compute work for every gallery.
pub fn plan_run(
    galleries: Vec<Gallery>,
    config: &SiteConfig,
    rebuild: bool,
) -> Result<RunPlan, ScanError> {
    let widths = config.widths().len() as u64;
    let mut planned = Vec::with_capacity(galleries.len());
    let mut image_count = 0;

    for gallery in galleries {
        let manifest = Manifest::load(&gallery.output_dir, rebuild)?;
        let (files, skipped) = compute_work(&gallery, &manifest, &config.images.extensions)?;
        tracing::debug!(
            slug = gallery.slug,
            pending = files.len(),
            skipped,
            "planned gallery"
        );
        image_count += files.len();
        planned.push(GalleryWork {
            gallery,
            manifest,
            files,
            skipped,
        });
    }

    Ok(RunPlan {
        galleries: planned,
        image_count,
        total_units: image_count as u64 * widths,
        rebuild,
    })
}
