//! CLI output formatting.
//!
//! Every entity leads with its positional index and name; paths and details
//! follow as indented context lines. Each view has a `format_*` function
//! returning lines (pure, tested) and, where the CLI needs it, a `print_*`
//! wrapper.
//!
//! ## Check
//!
//! ```text
//! Galleries
//! 001 Iceland (2 pending, 1 done)
//!     Source: photos/iceland/
//!     Output: public/images/iceland/
//!     Loader: cloudinary
//!     Pending: dawn.jpg
//!     Pending: glacier.png
//!
//! 2 images to process, 12 derivatives
//! ```
//!
//! ## Process
//!
//! ```text
//! Iceland (2 photos, 1 already processed)
//!     001 dawn.jpg 4000x3000
//!     002 glacier.png FAILED: Image processing failed: ...
//! ```
//!
//! ## Summary
//!
//! ```text
//! Summary
//!     iceland: 1 processed, 1 skipped, 1 failed
//!         glacier.png: Image processing failed: ...
//! Processed 1 image, skipped 1, failed 1
//! ```

use crate::frontmatter::Loader;
use crate::process::{ProcessEvent, RunSummary};
use crate::scan::RunPlan;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 image`, `3 images`
fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Path relative to the project root with a trailing slash, for directories.
fn display_dir(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    format!("{}/", rel.display())
}

fn loader_name(loader: Loader) -> &'static str {
    match loader {
        Loader::Static => "static",
        Loader::Cloudinary => "cloudinary",
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the planned work of a run.
pub fn format_plan(plan: &RunPlan, root: &Path) -> Vec<String> {
    let mut lines = vec!["Galleries".to_string()];
    if plan.galleries.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }

    for (i, work) in plan.galleries.iter().enumerate() {
        let gallery = &work.gallery;
        lines.push(format!(
            "{} {} ({} pending, {} done)",
            format_index(i + 1),
            gallery.title.as_deref().unwrap_or(&gallery.slug),
            work.files.len(),
            work.skipped
        ));
        lines.push(format!(
            "{}Source: {}",
            indent(1),
            display_dir(&gallery.source_dir, root)
        ));
        lines.push(format!(
            "{}Output: {}",
            indent(1),
            display_dir(&gallery.output_dir, root)
        ));
        lines.push(format!(
            "{}Loader: {}",
            indent(1),
            loader_name(gallery.options.loader)
        ));
        for file in &work.files {
            lines.push(format!("{}Pending: {}", indent(1), file));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "{} to process, {}",
        plural(plan.image_count, "image"),
        plural(plan.total_units as usize, "derivative")
    ));
    lines
}

pub fn print_plan(plan: &RunPlan, root: &Path) {
    for line in format_plan(plan, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Process
// ============================================================================

/// Format a single process event as display lines.
///
/// Derivative writes only move the progress bar and print nothing.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::GalleryStarted {
            slug,
            title,
            image_count,
            skipped,
        } => {
            let name = title.as_deref().unwrap_or(slug);
            let header = if *skipped > 0 {
                format!(
                    "{} ({}, {} already processed)",
                    name,
                    plural(*image_count, "photo"),
                    skipped
                )
            } else {
                format!("{} ({})", name, plural(*image_count, "photo"))
            };
            vec![header]
        }
        ProcessEvent::ImageProcessed {
            index,
            filename,
            width,
            height,
            uploaded,
        } => {
            let mut line = format!(
                "{}{} {} {}x{}",
                indent(1),
                format_index(*index),
                filename,
                width,
                height
            );
            if *uploaded {
                line.push_str(" (uploaded)");
            }
            vec![line]
        }
        ProcessEvent::ImageFailed {
            index,
            filename,
            reason,
            ..
        } => vec![format!(
            "{}{} {} FAILED: {}",
            indent(1),
            format_index(*index),
            filename,
            reason
        )],
        ProcessEvent::DerivativeWritten { .. } => Vec::new(),
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Format the end-of-run summary with every failure and its reason.
pub fn format_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec!["Summary".to_string()];
    for gallery in &summary.galleries {
        lines.push(format!(
            "{}{}: {} processed, {} skipped, {} failed",
            indent(1),
            gallery.slug,
            gallery.processed,
            gallery.skipped,
            gallery.failures.len()
        ));
        for failure in &gallery.failures {
            lines.push(format!(
                "{}{}: {}",
                indent(2),
                failure.filename,
                failure.reason
            ));
        }
    }
    lines.push(format!(
        "Processed {}, skipped {}, failed {}",
        plural(summary.processed(), "image"),
        summary.skipped(),
        summary.failed()
    ));
    lines
}

pub fn print_summary(summary: &RunSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::ProcessingOptions;
    use crate::manifest::Manifest;
    use crate::process::{FileFailure, GallerySummary};
    use crate::scan::{Gallery, GalleryWork};
    use std::path::PathBuf;

    fn gallery(slug: &str, title: Option<&str>, loader: Loader) -> Gallery {
        Gallery {
            slug: slug.to_string(),
            title: title.map(String::from),
            post_path: PathBuf::from(format!("/blog/content/posts/{slug}.md")),
            source_dir: PathBuf::from(format!("/blog/photos/{slug}")),
            output_dir: PathBuf::from(format!("/blog/public/images/{slug}")),
            options: ProcessingOptions {
                loader,
                ..ProcessingOptions::default()
            },
        }
    }

    #[test]
    fn index_is_zero_padded() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "image"), "1 image");
        assert_eq!(plural(0, "image"), "0 images");
    }

    // =========================================================================
    // Check
    // =========================================================================

    #[test]
    fn plan_lists_galleries_and_pending_files() {
        let plan = RunPlan {
            galleries: vec![
                GalleryWork {
                    gallery: gallery("iceland", Some("Iceland"), Loader::Cloudinary),
                    manifest: Manifest::empty(),
                    files: vec!["dawn.jpg".into(), "glacier.png".into()],
                    skipped: 1,
                },
                GalleryWork {
                    gallery: gallery("roma", None, Loader::Static),
                    manifest: Manifest::empty(),
                    files: vec![],
                    skipped: 4,
                },
            ],
            image_count: 2,
            total_units: 12,
            rebuild: false,
        };

        let lines = format_plan(&plan, Path::new("/blog"));
        assert_eq!(
            lines,
            vec![
                "Galleries",
                "001 Iceland (2 pending, 1 done)",
                "    Source: photos/iceland/",
                "    Output: public/images/iceland/",
                "    Loader: cloudinary",
                "    Pending: dawn.jpg",
                "    Pending: glacier.png",
                "002 roma (0 pending, 4 done)",
                "    Source: photos/roma/",
                "    Output: public/images/roma/",
                "    Loader: static",
                "",
                "2 images to process, 12 derivatives",
            ]
        );
    }

    #[test]
    fn empty_plan_says_none() {
        let plan = RunPlan {
            galleries: vec![],
            image_count: 0,
            total_units: 0,
            rebuild: false,
        };
        let lines = format_plan(&plan, Path::new("/blog"));
        assert_eq!(lines[1], "    (none)");
        assert_eq!(lines.last().unwrap(), "0 images to process, 0 derivatives");
    }

    // =========================================================================
    // Process events
    // =========================================================================

    #[test]
    fn gallery_header_uses_title_and_skip_count() {
        let event = ProcessEvent::GalleryStarted {
            slug: "iceland".into(),
            title: Some("Iceland".into()),
            image_count: 5,
            skipped: 2,
        };
        assert_eq!(
            format_process_event(&event),
            vec!["Iceland (5 photos, 2 already processed)"]
        );

        let event = ProcessEvent::GalleryStarted {
            slug: "roma".into(),
            title: None,
            image_count: 1,
            skipped: 0,
        };
        assert_eq!(format_process_event(&event), vec!["roma (1 photo)"]);
    }

    #[test]
    fn processed_image_line() {
        let event = ProcessEvent::ImageProcessed {
            index: 3,
            filename: "dawn.jpg".into(),
            width: 4000,
            height: 3000,
            uploaded: true,
        };
        assert_eq!(
            format_process_event(&event),
            vec!["    003 dawn.jpg 4000x3000 (uploaded)"]
        );
    }

    #[test]
    fn failed_image_line_carries_reason() {
        let event = ProcessEvent::ImageFailed {
            index: 2,
            filename: "bad.jpg".into(),
            reason: "truncated file".into(),
            units_missed: 3,
        };
        assert_eq!(
            format_process_event(&event),
            vec!["    002 bad.jpg FAILED: truncated file"]
        );
    }

    #[test]
    fn derivative_events_print_nothing() {
        assert!(format_process_event(&ProcessEvent::DerivativeWritten { bytes: 9 }).is_empty());
    }

    // =========================================================================
    // Summary
    // =========================================================================

    #[test]
    fn summary_totals_and_failures() {
        let summary = RunSummary {
            galleries: vec![
                GallerySummary {
                    slug: "iceland".into(),
                    processed: 2,
                    skipped: 1,
                    failures: vec![FileFailure {
                        filename: "glacier.png".into(),
                        reason: "bad data".into(),
                    }],
                },
                GallerySummary {
                    slug: "roma".into(),
                    processed: 1,
                    skipped: 0,
                    failures: vec![],
                },
            ],
        };
        assert_eq!(
            format_summary(&summary),
            vec![
                "Summary",
                "    iceland: 2 processed, 1 skipped, 1 failed",
                "        glacier.png: bad data",
                "    roma: 1 processed, 0 skipped, 0 failed",
                "Processed 3 images, skipped 1, failed 1",
            ]
        );
    }
}
