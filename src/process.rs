//! Batch processing: source photos to published images and manifest records.
//!
//! Takes the [`RunPlan`] from the scan stage and runs every pending file
//! through the per-image pipeline:
//!
//! ```text
//! read → EXIF → decode → orient → watermark → saturation
//!      → primary (+ EXIF block) → blur placeholder → metadata
//!      → derivatives (one per width, in parallel) → upload → manifest
//! ```
//!
//! ## Output Structure
//!
//! ```text
//! public/images/iceland/
//! ├── manifest.json            # flushed after every file
//! ├── dawn.jpg                 # primary: oriented, watermarked, EXIF policy applied
//! └── resized/
//!     ├── dawn-w10.jpg
//!     ├── dawn-w640.jpg
//!     └── dawn-w1920.jpg
//! ```
//!
//! ## Failure Isolation
//!
//! A file that fails to read, decode or encode is reported and left out of
//! the manifest, so the next run retries it; the rest of the gallery carries
//! on. A source whose stem is already taken by another source of the
//! gallery fails the same way before anything is written. Manifest writes
//! and uploads are structural: their failures stop the run.
//!
//! ## Concurrency
//!
//! Derivative widths of one file are rendered with rayon. Files of a gallery
//! run one at a time unless `processing.parallel_files` is set; either way a
//! single mutex guards the manifest and its flush.

use crate::config::{ConfigError, SiteConfig};
use crate::frontmatter::{Loader, ProcessingOptions};
use crate::geo::GeoResolver;
use crate::imaging::{
    BackendError, EncodeParams, ExifBlock, ExifPolicy, ImageBackend, OutputFormat,
    WatermarkParams, auto_orient, blur_data_url, composite_watermark, modulate,
    oriented_dimensions, render_derivative,
};
use crate::manifest::{ImageRecord, Manifest, ManifestError, WidthMap, ensure_output_dirs};
use crate::metadata;
use crate::scan::{Gallery, GalleryWork, RunPlan};
use crate::upload::{UploadError, UploadSink};
use image::DynamicImage;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Watermark {path} unusable: {reason}")]
    Watermark { path: PathBuf, reason: String },
    #[error("No output format for {0}")]
    UnsupportedFormat(String),
    #[error("Gallery \"{0}\" uses the cloudinary loader but no uploader is configured")]
    UploaderRequired(String),
    #[error("Output names of {file} are already taken by {owner}")]
    NameTaken { file: String, owner: String },
}

impl ProcessError {
    /// Errors that stop the whole run rather than one file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Manifest(_) | Self::Upload(_) | Self::UploaderRequired(_)
        )
    }
}

/// Progress events emitted while processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// A gallery is about to be processed.
    GalleryStarted {
        slug: String,
        title: Option<String>,
        image_count: usize,
        skipped: usize,
    },
    /// One derivative was written. One progress unit.
    DerivativeWritten { bytes: u64 },
    /// A file finished and is in the manifest.
    ImageProcessed {
        index: usize,
        filename: String,
        width: u32,
        height: u32,
        uploaded: bool,
    },
    /// A file failed and will be retried next run.
    ImageFailed {
        index: usize,
        filename: String,
        reason: String,
        /// Progress units that will never arrive for this file.
        units_missed: u64,
    },
}

/// A file that failed, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub filename: String,
    pub reason: String,
}

/// Outcome of one gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct GallerySummary {
    pub slug: String,
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<FileFailure>,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub galleries: Vec<GallerySummary>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.galleries.iter().map(|g| g.processed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.galleries.iter().map(|g| g.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.galleries.iter().map(|g| g.failures.len()).sum()
    }
}

/// The watermark image, decoded and oriented once per run.
pub struct Watermark {
    image: DynamicImage,
    params: WatermarkParams,
}

impl Watermark {
    pub fn load(
        backend: &impl ImageBackend,
        path: &Path,
        params: WatermarkParams,
    ) -> Result<Self, ProcessError> {
        let unusable = |reason: String| ProcessError::Watermark {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = fs::read(path).map_err(|e| unusable(e.to_string()))?;
        let exif = metadata::read_exif(&bytes);
        let image = backend
            .decode(&bytes, &lowercase_extension(path))
            .map_err(|e| unusable(e.to_string()))?;
        Ok(Self {
            image: auto_orient(image, metadata::orientation(exif.as_ref())),
            params,
        })
    }
}

/// `<stem>-w<width>.<ext>`
pub fn derivative_file_name(stem: &str, width: u32, format: OutputFormat) -> String {
    format!("{stem}-w{width}.{}", format.extension())
}

/// Outputs are named after the source stem, so sources may not share one.
/// Compared case-insensitively.
fn output_key(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_lowercase()
}

/// Pending files whose output names belong to another source, mapped to
/// that source.
///
/// Recorded files keep their names; pending files claim theirs in order.
fn taken_output_names(manifest: &Manifest, files: &[String]) -> HashMap<String, String> {
    let mut owners: HashMap<String, String> = HashMap::new();
    for recorded in manifest.filenames() {
        owners
            .entry(output_key(recorded))
            .or_insert_with(|| recorded.to_string());
    }
    let mut taken = HashMap::new();
    for file in files {
        match owners.get(&output_key(file)) {
            Some(owner) if owner != file => {
                taken.insert(file.clone(), owner.clone());
            }
            Some(_) => {}
            None => {
                owners.insert(output_key(file), file.clone());
            }
        }
    }
    taken
}

fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn exif_policy(options: &ProcessingOptions) -> ExifPolicy {
    ExifPolicy {
        strip: options.strip_exif,
        artist: options.artist.clone(),
        copyright: options.copyright.clone(),
    }
}

/// Optional channel wrapper; sending never fails the run.
struct Events(Option<Sender<ProcessEvent>>);

impl Events {
    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.0 {
            tx.send(event).ok();
        }
    }
}

/// An oriented, watermarked, saturation-adjusted source.
struct Transformed {
    image: DynamicImage,
    width: u32,
    height: u32,
}

/// Shared per-run state.
struct Pipeline<'a, B: ImageBackend> {
    backend: &'a B,
    config: &'a SiteConfig,
    widths: Vec<u32>,
    watermark: Option<Watermark>,
    geo: &'a dyn GeoResolver,
    events: Events,
}

/// Process everything in `plan`.
///
/// Configuration, the watermark and uploader availability are checked before
/// any file is touched. `uploader` serves galleries with the cloudinary loader.
pub fn run<B: ImageBackend>(
    backend: &B,
    config: &SiteConfig,
    root: &Path,
    plan: RunPlan,
    geo: &dyn GeoResolver,
    uploader: Option<&dyn UploadSink>,
    progress: Option<Sender<ProcessEvent>>,
) -> Result<RunSummary, ProcessError> {
    config.validate()?;

    if uploader.is_none()
        && let Some(work) = plan
            .galleries
            .iter()
            .find(|w| w.gallery.options.loader == Loader::Cloudinary && !w.files.is_empty())
    {
        return Err(ProcessError::UploaderRequired(work.gallery.slug.clone()));
    }

    let watermark = match config.watermark_path(root) {
        Some(path) if plan.image_count > 0 => {
            Some(Watermark::load(backend, &path, config.watermark_params())?)
        }
        _ => None,
    };

    let pipeline = Pipeline {
        backend,
        config,
        widths: config.widths(),
        watermark,
        geo,
        events: Events(progress),
    };

    let rebuild = plan.rebuild;
    let mut summary = RunSummary::default();
    for work in plan.galleries {
        summary
            .galleries
            .push(pipeline.process_gallery(work, rebuild, uploader)?);
    }
    Ok(summary)
}

impl<B: ImageBackend> Pipeline<'_, B> {
    fn process_gallery(
        &self,
        work: GalleryWork,
        rebuild: bool,
        uploader: Option<&dyn UploadSink>,
    ) -> Result<GallerySummary, ProcessError> {
        let GalleryWork {
            gallery,
            manifest,
            files,
            skipped,
        } = work;

        self.events.emit(ProcessEvent::GalleryStarted {
            slug: gallery.slug.clone(),
            title: gallery.title.clone(),
            image_count: files.len(),
            skipped,
        });
        let mut summary = GallerySummary {
            slug: gallery.slug.clone(),
            processed: 0,
            skipped,
            failures: Vec::new(),
        };
        if files.is_empty() && !rebuild {
            return Ok(summary);
        }

        let resized = ensure_output_dirs(&gallery.output_dir, &self.config.layout.resized_dir)?;
        if rebuild {
            // Drop records of sources deleted since the last run.
            manifest.save(&gallery.output_dir)?;
        }
        let uploader = match gallery.options.loader {
            Loader::Cloudinary => uploader,
            Loader::Static => None,
        };

        let taken = taken_output_names(&manifest, &files);
        let manifest = Mutex::new(manifest);
        let failures = Mutex::new(Vec::new());

        let handle = |index: usize, filename: &String| -> Result<(), ProcessError> {
            let written = AtomicU64::new(0);
            let result = match taken.get(filename) {
                Some(owner) => Err(ProcessError::NameTaken {
                    file: filename.clone(),
                    owner: owner.clone(),
                }),
                None => self.process_file(&gallery, filename, &resized, uploader, &written),
            };
            match result {
                Ok(record) => {
                    let (width, height) = (record.width, record.height);
                    let mut manifest = manifest.lock().unwrap_or_else(PoisonError::into_inner);
                    manifest.insert(filename.clone(), record);
                    manifest.save(&gallery.output_dir)?;
                    self.events.emit(ProcessEvent::ImageProcessed {
                        index,
                        filename: filename.clone(),
                        width,
                        height,
                        uploaded: uploader.is_some(),
                    });
                    Ok(())
                }
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    tracing::warn!(
                        slug = gallery.slug,
                        file = filename,
                        error = %e,
                        "image failed, it will be retried on the next run"
                    );
                    let units_missed =
                        (self.widths.len() as u64).saturating_sub(written.load(Ordering::Relaxed));
                    self.events.emit(ProcessEvent::ImageFailed {
                        index,
                        filename: filename.clone(),
                        reason: e.to_string(),
                        units_missed,
                    });
                    failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(FileFailure {
                            filename: filename.clone(),
                            reason: e.to_string(),
                        });
                    Ok(())
                }
            }
        };

        if self.config.processing.parallel_files {
            files
                .par_iter()
                .enumerate()
                .try_for_each(|(i, f)| handle(i + 1, f))?;
        } else {
            files
                .iter()
                .enumerate()
                .try_for_each(|(i, f)| handle(i + 1, f))?;
        }

        let mut failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        failures.sort_by(|a, b| a.filename.cmp(&b.filename));
        summary.processed = files.len() - failures.len();
        summary.failures = failures;
        Ok(summary)
    }

    /// Run one source file through the whole pipeline.
    ///
    /// Writes the primary and its derivatives, uploads when `uploader` is
    /// set, and returns the manifest record. Nothing is recorded on error.
    fn process_file(
        &self,
        gallery: &Gallery,
        filename: &str,
        resized: &Path,
        uploader: Option<&dyn UploadSink>,
        written: &AtomicU64,
    ) -> Result<ImageRecord, ProcessError> {
        let source = gallery.source_dir.join(filename);
        let extension = lowercase_extension(&source);
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        let format = OutputFormat::for_source(&extension, self.config.images.store_as_webp)
            .ok_or_else(|| ProcessError::UnsupportedFormat(filename.to_string()))?;
        let params = EncodeParams {
            format,
            quality: self.config.quality(),
        };

        let bytes = fs::read(&source)?;
        let exif = metadata::read_exif(&bytes);
        let transformed = self.transform(&bytes, &extension, exif.as_ref())?;
        let block = ExifBlock::build(exif.as_ref(), &exif_policy(&gallery.options));

        let mut primary = self.backend.encode(&transformed.image, &params)?;
        if let Some(block) = &block {
            primary = block.embed(primary)?;
        }
        let primary_path = gallery
            .output_dir
            .join(format!("{stem}.{}", primary.format.extension()));
        fs::write(&primary_path, &primary.bytes)?;
        tracing::debug!(file = %primary_path.display(), bytes = primary.bytes.len(), "primary written");

        let blur_data_url = blur_data_url(
            self.backend,
            &transformed.image,
            &self.config.blur_params(),
            &params,
        )?;
        let exif_summary = metadata::extract_metadata(exif.as_ref(), &gallery.options, self.geo);

        let widths_to_urls = self.generate_widths(
            &transformed.image,
            stem,
            &params,
            block.as_ref(),
            gallery,
            resized,
            uploader,
            written,
        )?;

        if let Some(sink) = uploader {
            sink.upload(&primary_path, &gallery.slug)?;
        }

        Ok(ImageRecord {
            width: transformed.width,
            height: transformed.height,
            blur_data_url,
            srcset: widths_to_urls.srcset(),
            widths_to_urls,
            date_time_original: exif_summary.date_time_original,
            latitude: exif_summary.latitude,
            longitude: exif_summary.longitude,
            geodata: exif_summary.geodata,
        })
    }

    /// Decode, orient, watermark and modulate a source.
    fn transform(
        &self,
        bytes: &[u8],
        extension: &str,
        exif: Option<&exif::Exif>,
    ) -> Result<Transformed, ProcessError> {
        let decoded = self.backend.decode(bytes, extension)?;
        let orientation = metadata::orientation(exif);
        let (width, height) = oriented_dimensions(decoded.width(), decoded.height(), orientation);
        let mut image = auto_orient(decoded, orientation);

        if let Some(mark) = &self.watermark {
            image = composite_watermark(&image, &mark.image, &mark.params);
        }
        let saturation = self.config.images.saturation;
        if (saturation - 1.0).abs() > f64::EPSILON {
            image = modulate(&image, saturation, 1.0);
        }

        Ok(Transformed {
            image,
            width,
            height,
        })
    }

    /// Render and write one derivative per width, in parallel.
    ///
    /// The returned map follows the order of the configured widths.
    #[allow(clippy::too_many_arguments)]
    fn generate_widths(
        &self,
        image: &DynamicImage,
        stem: &str,
        params: &EncodeParams,
        block: Option<&ExifBlock>,
        gallery: &Gallery,
        resized: &Path,
        uploader: Option<&dyn UploadSink>,
        written: &AtomicU64,
    ) -> Result<WidthMap, ProcessError> {
        let urls = self
            .widths
            .par_iter()
            .map(|&width| -> Result<(u32, String), ProcessError> {
                let mut encoded = render_derivative(self.backend, image, width, params)?;
                if let Some(block) = block {
                    encoded = block.embed(encoded)?;
                }
                let file_name = derivative_file_name(stem, width, encoded.format);
                fs::write(resized.join(&file_name), &encoded.bytes)?;
                written.fetch_add(1, Ordering::Relaxed);
                self.events.emit(ProcessEvent::DerivativeWritten {
                    bytes: encoded.bytes.len() as u64,
                });

                let url = uploader
                    .and_then(|sink| sink.delivery_url(&gallery.slug, stem, width))
                    .unwrap_or_else(|| self.config.layout.derivative_url(&gallery.slug, &file_name));
                Ok((width, url))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::tests::FixedGeoResolver;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::manifest::MANIFEST_FILENAME;
    use crate::test_helpers::*;
    use crate::upload::tests::RecordingSink;
    use std::sync::mpsc;

    const POST: &str = "title = \"Trip\"";

    fn run_plan(
        root: &Path,
        config: &SiteConfig,
        rebuild: bool,
        uploader: Option<&dyn UploadSink>,
    ) -> (Result<RunSummary, ProcessError>, MockBackend) {
        let backend = MockBackend::new();
        let plan = plan_for(root, config, rebuild);
        let result = run(
            &backend,
            config,
            root,
            plan,
            &FixedGeoResolver(None),
            uploader,
            None,
        );
        (result, backend)
    }

    fn manifest_of(root: &Path, slug: &str) -> Manifest {
        Manifest::load(&root.join("public/images").join(slug), false).unwrap()
    }

    fn keys(manifest: &Manifest) -> Vec<&str> {
        manifest.filenames().collect()
    }

    // =========================================================================
    // Single gallery, static loader
    // =========================================================================

    #[test]
    fn writes_primary_derivatives_and_record() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "640x480")]);
        let config = small_config();

        let (result, _) = run_plan(tmp.path(), &config, false, None);
        let summary = result.unwrap();
        assert_eq!(summary.processed(), 1);

        let out = tmp.path().join("public/images/trip");
        assert!(out.join("a.jpg").exists());
        for w in [10, 16, 64] {
            assert!(out.join(format!("resized/a-w{w}.jpg")).exists(), "width {w}");
        }

        let manifest = manifest_of(tmp.path(), "trip");
        let record = manifest.get("a.jpg").unwrap();
        assert_eq!((record.width, record.height), (640, 480));
        assert_eq!(record.widths_to_urls.widths().collect::<Vec<_>>(), vec![10, 16, 64]);
        assert_eq!(
            record.srcset,
            "/images/trip/resized/a-w10.jpg 10w, \
             /images/trip/resized/a-w16.jpg 16w, \
             /images/trip/resized/a-w64.jpg 64w"
        );
        assert!(
            record
                .blur_data_url
                .as_deref()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );
    }

    #[test]
    fn derivatives_are_resized_to_each_width() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "640x480")]);
        let (_, backend) = run_plan(tmp.path(), &small_config(), false, None);

        let mut widths = backend.encoded_widths();
        widths.sort();
        // primary 640, blur 4, derivatives 10/16/64
        assert_eq!(widths, vec![4, 10, 16, 64, 640]);
    }

    #[test]
    fn disabled_blur_records_null() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48")]);
        let mut config = small_config();
        config.blur.size = 0;

        run_plan(tmp.path(), &config, false, None).0.unwrap();
        assert_eq!(manifest_of(tmp.path(), "trip").get("a.jpg").unwrap().blur_data_url, None);
    }

    #[test]
    fn store_as_webp_changes_every_output() {
        let tmp = setup_project("trip", POST, &[("a.png", "64x48")]);
        let mut config = small_config();
        config.images.store_as_webp = true;

        let (_, backend) = run_plan(tmp.path(), &config, false, None);
        let out = tmp.path().join("public/images/trip");
        assert!(out.join("a.webp").exists());
        assert!(out.join("resized/a-w16.webp").exists());
        assert!(backend.get_operations().iter().all(|op| match op {
            RecordedOp::Encode { format, .. } => *format == OutputFormat::WebP,
            _ => true,
        }));
    }

    #[test]
    fn quality_reaches_the_encoder() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48")]);
        let mut config = small_config();
        config.images.quality = 55;

        let (_, backend) = run_plan(tmp.path(), &config, false, None);
        assert!(backend.get_operations().iter().all(|op| match op {
            RecordedOp::Encode { quality, .. } => *quality == 55,
            _ => true,
        }));
    }

    // =========================================================================
    // Incremental behavior
    // =========================================================================

    #[test]
    fn partial_failure_is_isolated_and_retried() {
        let tmp = setup_project(
            "trip",
            POST,
            &[("1.jpg", "64x48"), ("2.jpg", "not an image"), ("3.jpg", "48x64")],
        );
        let config = small_config();

        let summary = run_plan(tmp.path(), &config, false, None).0.unwrap();
        assert_eq!(summary.processed(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.galleries[0].failures[0].filename, "2.jpg");
        assert_eq!(keys(&manifest_of(tmp.path(), "trip")), vec!["1.jpg", "3.jpg"]);

        let plan = plan_for(tmp.path(), &config, false);
        assert_eq!(plan.galleries[0].files, vec!["2.jpg"]);
        assert_eq!(plan.galleries[0].skipped, 2);
    }

    #[test]
    fn sources_sharing_a_stem_never_share_outputs() {
        let tmp = setup_project(
            "trip",
            POST,
            &[
                ("a.jpg", "64x48"),
                ("a.jpeg", "20x40"),
                ("B.PNG", "16x16"),
                ("b.png", "32x32"),
            ],
        );
        let config = small_config();

        let summary = run_plan(tmp.path(), &config, false, None).0.unwrap();
        assert_eq!(summary.processed(), 2);
        let failed: Vec<_> = summary.galleries[0]
            .failures
            .iter()
            .map(|f| f.filename.as_str())
            .collect();
        assert_eq!(failed, vec!["a.jpg", "b.png"]);
        assert!(summary.galleries[0].failures[0].reason.contains("a.jpeg"));

        let manifest = manifest_of(tmp.path(), "trip");
        assert_eq!(keys(&manifest), vec!["B.PNG", "a.jpeg"]);
        let record = manifest.get("a.jpeg").unwrap();
        assert_eq!(
            record.widths_to_urls.get(64),
            Some("/images/trip/resized/a-w64.jpg")
        );
        let out = tmp.path().join("public/images/trip");
        assert_eq!(fs::read_to_string(out.join("resized/a-w64.jpg")).unwrap(), "jpg:64x128");
        assert_eq!(fs::read_to_string(out.join("resized/B-w16.png")).unwrap(), "png:16x16");

        // The owner keeps its name on later runs.
        let summary = run_plan(tmp.path(), &config, false, None).0.unwrap();
        assert_eq!(summary.processed(), 0);
        assert_eq!(summary.failed(), 2);
        assert_eq!(fs::read_to_string(out.join("resized/a-w64.jpg")).unwrap(), "jpg:64x128");
    }

    #[test]
    fn taken_names_respect_recorded_files() {
        let mut manifest = Manifest::empty();
        manifest.insert(
            "z.png".into(),
            ImageRecord {
                width: 1,
                height: 1,
                blur_data_url: None,
                srcset: String::new(),
                widths_to_urls: WidthMap::new(),
                date_time_original: None,
                latitude: None,
                longitude: None,
                geodata: None,
            },
        );
        let files = vec!["Z.jpg".to_string(), "y.jpg".to_string(), "y.webp".to_string()];
        let taken = taken_output_names(&manifest, &files);

        assert_eq!(taken.len(), 2);
        assert_eq!(taken["Z.jpg"], "z.png");
        assert_eq!(taken["y.webp"], "y.jpg");
    }

    #[test]
    fn second_run_does_nothing() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48"), ("b.jpg", "32x32")]);
        let config = small_config();
        run_plan(tmp.path(), &config, false, None).0.unwrap();

        let manifest_path = tmp.path().join("public/images/trip").join(MANIFEST_FILENAME);
        let before = fs::metadata(&manifest_path).unwrap().modified().unwrap();

        let (result, backend) = run_plan(tmp.path(), &config, false, None);
        let summary = result.unwrap();
        assert_eq!(summary.processed(), 0);
        assert_eq!(summary.skipped(), 2);
        assert!(backend.get_operations().is_empty());
        assert_eq!(fs::metadata(&manifest_path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn rebuild_replaces_manifest_content() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48"), ("b.jpg", "32x32")]);
        let config = small_config();
        run_plan(tmp.path(), &config, false, None).0.unwrap();

        fs::remove_file(tmp.path().join("photos/trip/a.jpg")).unwrap();
        let summary = run_plan(tmp.path(), &config, true, None).0.unwrap();

        assert_eq!(summary.processed(), 1);
        assert_eq!(keys(&manifest_of(tmp.path(), "trip")), vec!["b.jpg"]);
    }

    #[test]
    fn rebuild_of_emptied_gallery_clears_manifest() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48")]);
        let config = small_config();
        run_plan(tmp.path(), &config, false, None).0.unwrap();

        fs::remove_file(tmp.path().join("photos/trip/a.jpg")).unwrap();
        run_plan(tmp.path(), &config, true, None).0.unwrap();
        assert!(manifest_of(tmp.path(), "trip").is_empty());
    }

    #[test]
    fn parallel_files_produce_the_same_manifest() {
        let files = [("a.jpg", "64x48"), ("b.jpg", "bad"), ("c.jpg", "32x32"), ("d.png", "16x16")];
        let sequential = setup_project("trip", POST, &files);
        let parallel = setup_project("trip", POST, &files);
        let mut config = small_config();
        run_plan(sequential.path(), &config, false, None).0.unwrap();
        config.processing.parallel_files = true;
        let summary = run_plan(parallel.path(), &config, false, None).0.unwrap();

        assert_eq!(summary.galleries[0].failures.len(), 1);
        assert_eq!(
            manifest_of(sequential.path(), "trip"),
            manifest_of(parallel.path(), "trip")
        );
    }

    #[test]
    fn empty_plan_is_a_no_op() {
        let tmp = setup_project("trip", POST, &[]);
        let summary = run_plan(tmp.path(), &small_config(), false, None).0.unwrap();
        assert_eq!(summary.processed(), 0);
        assert!(!tmp.path().join("public/images/trip").exists());
    }

    // =========================================================================
    // Configuration and watermark
    // =========================================================================

    #[test]
    fn invalid_watermark_ratio_fails_before_any_file() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48")]);
        let mut config = small_config();
        config.watermark.size_ratio = 1.5;

        let (result, backend) = run_plan(tmp.path(), &config, false, None);
        assert!(matches!(
            result,
            Err(ProcessError::Config(ConfigError::InvalidWatermarkRatio(_)))
        ));
        assert!(backend.get_operations().is_empty());
        assert!(!tmp.path().join("public/images/trip").exists());
    }

    #[test]
    fn missing_watermark_file_is_fatal() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48")]);
        let mut config = small_config();
        config.watermark.file = Some("mark.png".into());

        let (result, _) = run_plan(tmp.path(), &config, false, None);
        assert!(matches!(result, Err(ProcessError::Watermark { .. })));
    }

    #[test]
    fn watermark_is_decoded_once_per_run() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "640x480"), ("b.jpg", "480x640")]);
        write_file(tmp.path(), "mark.png", "100x50");
        let mut config = small_config();
        config.watermark.file = Some("mark.png".into());

        let (result, backend) = run_plan(tmp.path(), &config, false, None);
        assert_eq!(result.unwrap().processed(), 2);
        let decodes: Vec<RecordedOp> = backend
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Decode(_)))
            .collect();
        assert_eq!(decodes.len(), 3);
        assert_eq!(decodes[0], RecordedOp::Decode("png".into()));
    }

    // =========================================================================
    // Cloudinary loader
    // =========================================================================

    const CLOUD_POST: &str = "loader = \"cloudinary\"";

    #[test]
    fn cloudinary_gallery_uploads_primaries_and_uses_cdn_urls() {
        let tmp = setup_project("trip", CLOUD_POST, &[("a.jpg", "64x48"), ("b.jpg", "32x32")]);
        let sink = RecordingSink::default();

        run_plan(tmp.path(), &small_config(), false, Some(&sink)).0.unwrap();

        let uploads = sink.uploads.lock().unwrap().clone();
        assert_eq!(
            uploads,
            vec![
                ("a.jpg".to_string(), "trip".to_string()),
                ("b.jpg".to_string(), "trip".to_string())
            ]
        );
        let record = manifest_of(tmp.path(), "trip").get("a.jpg").unwrap().clone();
        assert_eq!(record.widths_to_urls.get(16), Some("cdn://trip/a?w=16"));
        assert!(tmp.path().join("public/images/trip/resized/a-w16.jpg").exists());
    }

    #[test]
    fn static_gallery_never_uploads() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48")]);
        let sink = RecordingSink::default();

        run_plan(tmp.path(), &small_config(), false, Some(&sink)).0.unwrap();
        assert!(sink.uploads.lock().unwrap().is_empty());
        let record = manifest_of(tmp.path(), "trip").get("a.jpg").unwrap().clone();
        assert_eq!(record.widths_to_urls.get(16), Some("/images/trip/resized/a-w16.jpg"));
    }

    #[test]
    fn upload_failure_stops_the_run_without_recording() {
        let tmp = setup_project("trip", CLOUD_POST, &[("a.jpg", "64x48"), ("b.jpg", "32x32")]);
        let sink = RecordingSink {
            fail_on: Some("a.jpg".into()),
            ..Default::default()
        };

        let (result, _) = run_plan(tmp.path(), &small_config(), false, Some(&sink));
        assert!(matches!(result, Err(ProcessError::Upload(_))));
        assert!(!manifest_of(tmp.path(), "trip").contains("a.jpg"));
        assert!(sink.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn cloudinary_gallery_without_uploader_is_refused() {
        let tmp = setup_project("trip", CLOUD_POST, &[("a.jpg", "64x48")]);
        let (result, backend) = run_plan(tmp.path(), &small_config(), false, None);
        assert!(matches!(result, Err(ProcessError::UploaderRequired(s)) if s == "trip"));
        assert!(backend.get_operations().is_empty());
    }

    // =========================================================================
    // Events
    // =========================================================================

    #[test]
    fn events_account_for_every_progress_unit() {
        let tmp = setup_project("trip", POST, &[("a.jpg", "64x48"), ("b.jpg", "broken")]);
        let config = small_config();
        let plan = plan_for(tmp.path(), &config, false);
        let total = plan.total_units;
        let (tx, rx) = mpsc::channel();

        run(
            &MockBackend::new(),
            &config,
            tmp.path(),
            plan,
            &FixedGeoResolver(None),
            None,
            Some(tx),
        )
        .unwrap();
        let events: Vec<ProcessEvent> = rx.iter().collect();

        assert!(matches!(
            &events[0],
            ProcessEvent::GalleryStarted { slug, image_count: 2, .. } if slug == "trip"
        ));
        let units: u64 = events
            .iter()
            .map(|e| match e {
                ProcessEvent::DerivativeWritten { .. } => 1,
                ProcessEvent::ImageFailed { units_missed, .. } => *units_missed,
                _ => 0,
            })
            .sum();
        assert_eq!(units, total);
        assert!(events.iter().any(|e| matches!(
            e,
            ProcessEvent::ImageProcessed { index: 1, width: 64, height: 48, uploaded: false, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ProcessEvent::ImageFailed { index: 2, filename, .. } if filename == "b.jpg"
        )));
    }

    #[test]
    fn derivative_names() {
        assert_eq!(derivative_file_name("dawn", 640, OutputFormat::WebP), "dawn-w640.webp");
        assert_eq!(derivative_file_name("a.b", 10, OutputFormat::Jpeg), "a.b-w10.jpg");
    }
}
