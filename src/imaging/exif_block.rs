//! EXIF blocks for output files.
//!
//! Pixels are re-encoded from scratch, so output files carry no metadata
//! unless a block is attached here. Two policies:
//!
//! - **strip**: a fresh block holding only `Artist` / `Copyright`.
//! - **keep**: the source's primary-image fields (including the Exif and GPS
//!   sub-IFDs) with `Orientation` removed, since pixels are already upright,
//!   and `Artist` / `Copyright` overwritten when set.
//!
//! Blocks are serialized with kamadak-exif's writer and attached to the
//! encoded container with `img-parts`. AVIF output has no `img-parts` support
//! and is written bare.

use super::backend::{BackendError, Encoded};
use super::params::OutputFormat;
use exif::experimental::Writer;
use exif::{Exif, Field, In, Tag, Value};
use img_parts::{Bytes, DynImage, ImageEXIF};
use std::io::Cursor;

/// Tags the writer derives itself, or that make no sense after re-encoding.
const SKIPPED_TAGS: &[Tag] = &[
    Tag::Orientation,
    Tag::Artist,
    Tag::Copyright,
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::TileOffsets,
    Tag::TileByteCounts,
];

/// What to write into output metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifPolicy {
    pub strip: bool,
    pub artist: Option<String>,
    pub copyright: Option<String>,
}

/// A serialized TIFF-structured EXIF block (no `Exif\0\0` prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExifBlock(Vec<u8>);

fn ascii_field(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

fn serialize(fields: &[Field]) -> Result<Vec<u8>, exif::Error> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false)?;
    Ok(buf.into_inner())
}

impl ExifBlock {
    /// Build the block for one output, or `None` when there is nothing to write.
    ///
    /// A source block the writer rejects degrades to the minimal block with a
    /// warning.
    pub fn build(source: Option<&Exif>, policy: &ExifPolicy) -> Option<Self> {
        let overrides: Vec<Field> = [
            (Tag::Artist, policy.artist.as_deref()),
            (Tag::Copyright, policy.copyright.as_deref()),
        ]
        .into_iter()
        .filter_map(|(tag, text)| text.map(|t| ascii_field(tag, t)))
        .collect();

        if let (false, Some(exif)) = (policy.strip, source) {
            let mut fields: Vec<Field> = exif
                .fields()
                .filter(|f| f.ifd_num == In::PRIMARY && !SKIPPED_TAGS.contains(&f.tag))
                .cloned()
                .collect();
            fields.extend(overrides.iter().cloned());
            if !fields.is_empty() {
                match serialize(&fields) {
                    Ok(bytes) => return Some(Self(bytes)),
                    Err(e) => {
                        tracing::warn!(error = %e, "source EXIF could not be rewritten, keeping artist/copyright only");
                    }
                }
            }
        }

        if overrides.is_empty() {
            return None;
        }
        match serialize(&overrides) {
            Ok(bytes) => Some(Self(bytes)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to write EXIF block");
                None
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Attach this block to an encoded file.
    pub fn embed(&self, encoded: Encoded) -> Result<Encoded, BackendError> {
        if encoded.format == OutputFormat::Avif {
            return Ok(encoded);
        }
        let format = encoded.format;
        let mut container = DynImage::from_bytes(Bytes::from(encoded.bytes))
            .map_err(|e| BackendError::ProcessingFailed(format!("EXIF embed: {e}")))?
            .ok_or_else(|| {
                BackendError::ProcessingFailed(format!("EXIF embed: unsupported {format} container"))
            })?;
        container.set_exif(Some(Bytes::copy_from_slice(&self.0)));

        let mut bytes = Vec::new();
        container.encoder().write_to(&mut bytes)?;
        Ok(Encoded { bytes, format })
    }
}
