use clap::{Parser, Subcommand};
use slideprep::frontmatter::Loader;
use slideprep::geo::OfflineGeocoder;
use slideprep::imaging::RustBackend;
use slideprep::progress::{LogSink, Progress};
use slideprep::upload::{CloudinaryUploader, UploadSink};
use slideprep::{config, output, process, scan};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Gallery selection shared by the commands that plan work.
#[derive(clap::Args, Clone)]
struct GalleryArgs {
    /// Only these galleries (by slug). Repeatable.
    #[arg(long = "gallery", value_name = "SLUG")]
    galleries: Vec<String>,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "slideprep")]
#[command(about = "Prepare photoblog slideshow galleries: derivatives, placeholders and manifests")]
#[command(long_about = "\
Prepare photoblog slideshow galleries: derivatives, placeholders and manifests

Every post with a matching photo directory is a gallery. Each source photo is
oriented, optionally watermarked, written to the public directory with its
resized derivatives, and recorded in the gallery's manifest.json together with
a blur placeholder, srcset and EXIF-derived metadata.

Project structure:

  blog/
  ├── slideprep.toml               # Optional settings (see gen-config)
  ├── content/posts/
  │   └── iceland.md               # +++ TOML front matter +++ selects options
  ├── photos/
  │   └── iceland/                 # Gallery sources, named by post slug
  │       ├── dawn.jpg
  │       └── glacier.png
  └── public/images/iceland/       # Output
      ├── manifest.json
      ├── dawn.jpg
      └── resized/dawn-w640.jpg

Front matter options (per post):
  loader          \"cloudinary\" uploads primaries and uses CDN URLs
  geocode         resolve GPS coordinates to a place name
  showCoordinates record latitude/longitude
  showDatetimes   record the capture time
  stripExif       drop source EXIF from outputs
  artist          Artist tag written to outputs
  copyright       Copyright tag written to outputs

Runs are incremental: files already in a manifest are skipped. Use
'process --rebuild' or 'export' to reprocess everything.")]
#[command(version = version_string())]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process new photos (incremental)
    Process {
        #[command(flatten)]
        select: GalleryArgs,
        /// Discard manifests and reprocess every photo
        #[arg(long)]
        rebuild: bool,
    },
    /// Reprocess every photo (same as `process --rebuild`)
    Export(GalleryArgs),
    /// Validate config and front matter, and list pending work
    Check(GalleryArgs),
    /// Print a stock slideprep.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let sink = LogSink::new();
    init_tracing(cli.verbose, sink.clone());

    match cli.command {
        Command::Process { select, rebuild } => {
            run_process(&cli.root, &select.galleries, rebuild, &sink)?;
        }
        Command::Export(select) => {
            run_process(&cli.root, &select.galleries, true, &sink)?;
        }
        Command::Check(select) => {
            println!("==> Checking {}", cli.root.display());
            let config = config::load_config(&cli.root)?;
            scan::check_project_root(&cli.root, &config);
            let galleries = scan::discover_galleries(&cli.root, &config, &select.galleries)?;
            let plan = scan::plan_run(galleries, &config, false)?;
            output::print_plan(&plan, &cli.root);
            println!("==> Project is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Plan and run processing with a progress bar, then print the summary.
fn run_process(
    root: &Path,
    filter: &[String],
    rebuild: bool,
    sink: &LogSink,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config(root)?;
    scan::check_project_root(root, &config);
    init_thread_pool(&config.processing);

    let galleries = scan::discover_galleries(root, &config, filter)?;
    let plan = scan::plan_run(galleries, &config, rebuild)?;
    tracing::info!(
        galleries = plan.galleries.len(),
        images = plan.image_count,
        rebuild,
        "planned run"
    );

    let needs_upload = plan
        .galleries
        .iter()
        .any(|w| w.gallery.options.loader == Loader::Cloudinary && !w.files.is_empty());
    let uploader = if needs_upload {
        Some(CloudinaryUploader::from_config(&config.cloudinary)?)
    } else {
        None
    };
    let backend = RustBackend::new();
    let geo = OfflineGeocoder::new();

    let mut progress = Progress::new(plan.total_units);
    let guard = sink.attach(progress.bar().clone());
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            progress.apply(&event);
        }
        progress.finish();
    });

    let result = process::run(
        &backend,
        &config,
        root,
        plan,
        &geo,
        uploader.as_ref().map(|u| u as &dyn UploadSink),
        Some(tx),
    );
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    drop(guard);

    let summary = result?;
    output::print_summary(&summary);
    Ok(())
}

/// Log through the sink at `info`, or `RUST_LOG`; `-v` turns on debug.
fn init_tracing(verbose: bool, sink: LogSink) {
    let filter = if verbose {
        EnvFilter::new("slideprep=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(sink)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores; config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
