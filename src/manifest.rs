//! Per-gallery manifest of processed images.
//!
//! The manifest is the resume point of the pipeline: a source filename is a
//! key exactly when that file went through the full pipeline (primary output,
//! every derivative, placeholder). Anything absent is processed on the next
//! run; anything present is skipped unless the run is a rebuild.
//!
//! # Storage
//!
//! `<gallery output>/manifest.json`, a JSON object keyed by source filename,
//! pretty-printed with 4-space indentation:
//!
//! ```json
//! {
//!     "dawn.jpg": {
//!         "width": 1000,
//!         "height": 2000,
//!         "blurDataURL": "data:image/jpeg;base64,...",
//!         "srcset": "/images/trip/resized/dawn-w10.jpg 10w, ...",
//!         "widthsToUrls": {
//!             "10": "/images/trip/resized/dawn-w10.jpg"
//!         },
//!         "dateTimeOriginal": "2023-07-14T18:05:09"
//!     }
//! }
//! ```
//!
//! The file is rewritten after every completed image, through a temp file and
//! a rename, so an interrupted run leaves the previous complete manifest.
//!
//! A manifest that exists but does not parse is an error: guessing which
//! files were done would either redo or silently drop work.

use crate::geo::GeoData;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the manifest file within a gallery output directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt manifest {path}: {source}")]
    CorruptManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Derivative URLs by pixel width, in generation order.
///
/// Serialized as a JSON object with width keys; order is preserved both ways
/// so [`srcset`](Self::srcset) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidthMap(Vec<(u32, String)>);

impl WidthMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL for `width`, replacing an earlier one in place.
    pub fn insert(&mut self, width: u32, url: String) {
        match self.0.iter_mut().find(|(w, _)| *w == width) {
            Some(entry) => entry.1 = url,
            None => self.0.push((width, url)),
        }
    }

    pub fn get(&self, width: u32) -> Option<&str> {
        self.0
            .iter()
            .find(|(w, _)| *w == width)
            .map(|(_, url)| url.as_str())
    }

    pub fn widths(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().map(|(w, _)| *w)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `"<url> <width>w, ..."` in insertion order.
    pub fn srcset(&self) -> String {
        self.0
            .iter()
            .map(|(w, url)| format!("{url} {w}w"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<(u32, String)> for WidthMap {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        let mut map = WidthMap::new();
        for (w, url) in iter {
            map.insert(w, url);
        }
        map
    }
}

impl Serialize for WidthMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (w, url) in &self.0 {
            map.serialize_entry(&w.to_string(), url)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WidthMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WidthMapVisitor;

        impl<'de> Visitor<'de> for WidthMapVisitor {
            type Value = WidthMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of pixel widths to URLs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<WidthMap, A::Error> {
                let mut map = WidthMap::new();
                while let Some((key, url)) = access.next_entry::<String, String>()? {
                    let width = key.parse::<u32>().map_err(|_| {
                        serde::de::Error::custom(format!("width key \"{key}\" is not a number"))
                    })?;
                    map.insert(width, url);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(WidthMapVisitor)
    }
}

/// Everything the site needs to render one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Width after orientation normalization.
    pub width: u32,
    /// Height after orientation normalization.
    pub height: u32,
    /// Inline placeholder, `null` when placeholders are disabled.
    #[serde(rename = "blurDataURL", default)]
    pub blur_data_url: Option<String>,
    pub srcset: String,
    pub widths_to_urls: WidthMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time_original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geodata: Option<GeoData>,
}

/// Processed images of one gallery, keyed by source filename.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    records: BTreeMap<String, ImageRecord>,
}

impl Manifest {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from the gallery output directory.
    ///
    /// Returns an empty manifest for a rebuild or when the file doesn't
    /// exist. A file that exists but isn't a valid manifest is an error.
    pub fn load(output_dir: &Path, rebuild: bool) -> Result<Self, ManifestError> {
        if rebuild {
            return Ok(Self::empty());
        }
        let path = output_dir.join(MANIFEST_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|source| ManifestError::CorruptManifest { path, source })
    }

    /// Write to the gallery output directory via a temp file and rename.
    pub fn save(&self, output_dir: &Path) -> Result<(), ManifestError> {
        std::fs::create_dir_all(output_dir)?;
        let mut json = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, formatter);
        self.serialize(&mut serializer)?;
        json.push(b'\n');

        let path = output_dir.join(MANIFEST_FILENAME);
        let tmp = output_dir.join(format!("{MANIFEST_FILENAME}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.records.contains_key(filename)
    }

    pub fn get(&self, filename: &str) -> Option<&ImageRecord> {
        self.records.get(filename)
    }

    pub fn insert(&mut self, filename: String, record: ImageRecord) {
        self.records.insert(filename, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

/// Create a gallery's output and derivative directories.
pub fn ensure_output_dirs(output_dir: &Path, resized_dir: &str) -> std::io::Result<PathBuf> {
    let resized = output_dir.join(resized_dir);
    std::fs::create_dir_all(&resized)?;
    Ok(resized)
}
