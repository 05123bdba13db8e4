//! Post front matter: per-gallery processing options.
//!
//! Each post starts with a TOML block fenced by `+++` lines:
//!
//! ```text
//! +++
//! title = "Iceland"
//! loader = "cloudinary"
//! geocode = true
//! showCoordinates = "no"
//! stripExif = true
//! artist = "Jane Doe"
//! copyright = "(c) 2024 Jane Doe"
//! +++
//!
//! Markdown body...
//! ```
//!
//! Boolean-like options are loose on purpose: authors write `"no"`, `0`,
//! `false` or leave them out. [`Toggle`] captures that once, here, and the
//! rest of the pipeline only ever sees plain `bool`s in [`ProcessingOptions`].

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

const FENCE: &str = "+++";

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("front matter is not closed with `+++`")]
    Unterminated,
    #[error("front matter TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Tri-state boolean option as written by an author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Toggle {
    Yes,
    No,
    #[default]
    Unset,
}

impl Toggle {
    /// `Yes` is the only truthy state.
    pub fn enabled(self) -> bool {
        self == Toggle::Yes
    }

    fn from_str_value(s: &str) -> Self {
        if s.is_empty() || s == "no" {
            Toggle::No
        } else {
            Toggle::Yes
        }
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ToggleVisitor;

        impl Visitor<'_> for ToggleVisitor {
            type Value = Toggle;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a boolean, number or string")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Toggle, E> {
                Ok(if v { Toggle::Yes } else { Toggle::No })
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Toggle, E> {
                Ok(if v == 0 { Toggle::No } else { Toggle::Yes })
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Toggle, E> {
                Ok(if v == 0 { Toggle::No } else { Toggle::Yes })
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Toggle, E> {
                Ok(if v == 0.0 || v.is_nan() { Toggle::No } else { Toggle::Yes })
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Toggle, E> {
                Ok(Toggle::from_str_value(v))
            }
        }

        deserializer.deserialize_any(ToggleVisitor)
    }
}

/// Where a gallery's images are served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Loader {
    /// Files under the public directory.
    #[default]
    Static,
    /// Cloudinary delivery URLs; primaries are uploaded.
    Cloudinary,
}

impl Loader {
    /// Loader for a front-matter value. Unknown names fall back to `Static`.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(n) if n.eq_ignore_ascii_case("cloudinary") => Loader::Cloudinary,
            None | Some("") => Loader::Static,
            Some(n) if n.eq_ignore_ascii_case("static") || n.eq_ignore_ascii_case("default") => {
                Loader::Static
            }
            Some(other) => {
                tracing::warn!(loader = other, "unknown loader, using static files");
                Loader::Static
            }
        }
    }
}

/// Raw front matter. Keys this tool does not use are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrontMatter {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub loader: Option<String>,
    pub geocode: Toggle,
    pub show_coordinates: Toggle,
    pub show_datetimes: Toggle,
    pub strip_exif: Toggle,
    pub artist: Option<String>,
    pub copyright: Option<String>,
    pub index_button_type: Option<String>,
}

/// Resolved per-gallery options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingOptions {
    pub loader: Loader,
    pub geocode: bool,
    pub show_coordinates: bool,
    pub show_datetimes: bool,
    pub strip_exif: bool,
    pub artist: Option<String>,
    pub copyright: Option<String>,
}

impl FrontMatter {
    pub fn processing_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            loader: Loader::from_name(self.loader.as_deref()),
            geocode: self.geocode.enabled(),
            show_coordinates: self.show_coordinates.enabled(),
            show_datetimes: self.show_datetimes.enabled(),
            strip_exif: self.strip_exif.enabled(),
            artist: non_empty(&self.artist),
            copyright: non_empty(&self.copyright),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Parse the leading `+++` block of a post. No block means all defaults.
pub fn parse_front_matter(text: &str) -> Result<FrontMatter, FrontMatterError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim_end() == FENCE => {}
        _ => return Ok(FrontMatter::default()),
    }

    let mut block = String::new();
    for line in lines {
        if line.trim_end() == FENCE {
            return Ok(toml::from_str(&block)?);
        }
        block.push_str(line);
        block.push('\n');
    }
    Err(FrontMatterError::Unterminated)
}
