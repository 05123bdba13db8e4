//! Shared test utilities: throwaway blog projects and a small config.
//!
//! Projects are laid out with the default [`LayoutConfig`](crate::config::LayoutConfig):
//!
//! ```text
//! <tmp>/
//! ├── content/posts/<slug>.md    # +++ <front matter> +++
//! ├── photos/<slug>/<files>
//! └── public/
//! ```
//!
//! Source files hold whatever text the test passes; with
//! [`MockBackend`](crate::imaging::backend::tests::MockBackend) a
//! `"<w>x<h>"` body decodes to a gray image of that size and anything else
//! fails to decode.

use crate::config::SiteConfig;
use crate::scan::{RunPlan, discover_galleries, plan_run};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write `content` at `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A project with one gallery. `front_matter` goes between the `+++` fences.
pub fn setup_project(slug: &str, front_matter: &str, sources: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(
        root,
        &format!("content/posts/{slug}.md"),
        format!("+++\n{front_matter}\n+++\n\nA post.\n"),
    );
    fs::create_dir_all(root.join("photos").join(slug)).unwrap();
    for (name, content) in sources {
        write_file(root, &format!("photos/{slug}/{name}"), content);
    }
    fs::create_dir_all(root.join("public")).unwrap();
    tmp
}

/// Defaults with three derivative widths (10, 16, 64) and a 4px placeholder.
pub fn small_config() -> SiteConfig {
    let mut config = SiteConfig::default();
    config.images.blur_width = 10;
    config.images.image_sizes = vec![16];
    config.images.device_sizes = vec![64];
    config.blur.size = 4;
    config
}

/// Discover every gallery under `root` and plan a run.
pub fn plan_for(root: &Path, config: &SiteConfig, rebuild: bool) -> RunPlan {
    let galleries = discover_galleries(root, config, &[]).unwrap();
    plan_run(galleries, config, rebuild).unwrap()
}
