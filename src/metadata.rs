//! EXIF metadata extraction.
//!
//! Source files are parsed once with `kamadak-exif`; the parsed block feeds
//! three consumers:
//!
//! - **Orientation** for pixel normalization and the swapped record dimensions.
//! - **Record fields**: capture time, GPS coordinates and the resolved place.
//! - **Output EXIF** when the gallery keeps source metadata
//!   (see [`ExifBlock`](crate::imaging::ExifBlock)).
//!
//! Missing tags are never errors. A photo without GPS simply has no
//! coordinates; a scanned slide without a capture time has no date.
//!
//! ## Capture time
//!
//! `DateTimeOriginal` carries no zone. It is rendered as
//! `YYYY-MM-DDTHH:MM:SS` and treated as UTC without correction, so cameras
//! set to local time report local wall-clock time.

use crate::frontmatter::ProcessingOptions;
use crate::geo::{GeoData, GeoResolver};
use chrono::NaiveDate;
use exif::{Exif, In, Reader, Tag, Value};
use std::io::Cursor;

/// EXIF-derived fields of an image record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifSummary {
    pub date_time_original: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geodata: Option<GeoData>,
}

/// Parse the EXIF block of a source file, if it has one.
pub fn read_exif(bytes: &[u8]) -> Option<Exif> {
    match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Some(exif),
        Err(e) => {
            tracing::debug!(error = %e, "no readable EXIF block");
            None
        }
    }
}

/// EXIF orientation tag (1-8) of the primary image.
pub fn orientation(exif: Option<&Exif>) -> Option<u32> {
    exif?
        .get_field(Tag::Orientation, In::PRIMARY)?
        .value
        .get_uint(0)
        .filter(|tag| (1..=8).contains(tag))
}

/// Degrees/minutes/seconds to signed decimal degrees.
///
/// Southern and western hemispheres are negative.
///
/// ```
/// # use slideprep::metadata::convert_dms_to_dd;
/// assert_eq!(convert_dms_to_dd(40.0, 30.0, 0.0, "N"), 40.5);
/// assert_eq!(convert_dms_to_dd(40.0, 30.0, 0.0, "S"), -40.5);
/// ```
pub fn convert_dms_to_dd(degrees: f64, minutes: f64, seconds: f64, reference: &str) -> f64 {
    let dd = degrees + minutes / 60.0 + seconds / 3600.0;
    match reference.trim() {
        "S" | "W" | "s" | "w" => -dd,
        _ => dd,
    }
}

fn ascii_value(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

/// One GPS axis from its DMS rational triple and hemisphere reference.
fn gps_axis(exif: &Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let parts = match &exif.get_field(value_tag, In::PRIMARY)?.value {
        Value::Rational(parts) if !parts.is_empty() => parts,
        _ => return None,
    };
    let part = |i: usize| parts.get(i).map(|r| r.to_f64()).unwrap_or(0.0);
    let reference = ascii_value(exif, ref_tag).unwrap_or_default();
    let dd = convert_dms_to_dd(part(0), part(1), part(2), &reference);
    dd.is_finite().then_some(dd)
}

/// GPS position as `(latitude, longitude)` decimal degrees.
pub fn coordinates(exif: &Exif) -> Option<(f64, f64)> {
    let lat = gps_axis(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let lon = gps_axis(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;
    Some((lat, lon))
}

/// `DateTimeOriginal` as `YYYY-MM-DDTHH:MM:SS`.
pub fn date_time_original(exif: &Exif) -> Option<String> {
    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    let raw = match &field.value {
        Value::Ascii(parts) => parts.first()?,
        _ => return None,
    };
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    let naive = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?
        .and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())?;
    Some(naive.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Collect the record fields the gallery options ask for.
pub fn extract_metadata(
    exif: Option<&Exif>,
    options: &ProcessingOptions,
    geo: &dyn GeoResolver,
) -> ExifSummary {
    let Some(exif) = exif else {
        return ExifSummary::default();
    };

    let date_time_original = if options.show_datetimes {
        let dt = date_time_original(exif);
        if dt.is_none() {
            tracing::debug!("no DateTimeOriginal tag");
        }
        dt
    } else {
        None
    };

    let coords = if options.show_coordinates || options.geocode {
        let coords = coordinates(exif);
        if coords.is_none() {
            tracing::debug!("no GPS position");
        }
        coords
    } else {
        None
    };

    let geodata = match coords {
        Some((lat, lon)) if options.geocode => {
            let place = geo.resolve(lat, lon);
            if place.is_none() {
                tracing::debug!(lat, lon, "coordinates did not resolve to a place");
            }
            place
        }
        _ => None,
    };

    let (latitude, longitude) = match coords {
        Some((lat, lon)) if options.show_coordinates => (Some(lat), Some(lon)),
        _ => (None, None),
    };

    ExifSummary {
        date_time_original,
        latitude,
        longitude,
        geodata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::tests::FixedGeoResolver;
    use exif::experimental::Writer;
    use exif::{Field, Rational};

    fn ascii(tag: Tag, text: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![text.as_bytes().to_vec()]),
        }
    }

    fn dms(tag: Tag, d: u32, m: u32, s_hundredths: u32) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![
                Rational { num: d, denom: 1 },
                Rational { num: m, denom: 1 },
                Rational {
                    num: s_hundredths,
                    denom: 100,
                },
            ]),
        }
    }

    /// A parsed EXIF block with Amsterdam-ish coordinates and a capture time.
    fn sample_exif(extra: Vec<Field>) -> Exif {
        let mut fields = vec![
            ascii(Tag::DateTimeOriginal, "2023:07:14 18:05:09"),
            dms(Tag::GPSLatitude, 52, 22, 4500),
            ascii(Tag::GPSLatitudeRef, "N"),
            dms(Tag::GPSLongitude, 4, 54, 0),
            ascii(Tag::GPSLongitudeRef, "E"),
        ];
        fields.extend(extra);

        let mut writer = Writer::new();
        for f in &fields {
            writer.push_field(f);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        Reader::new().read_raw(buf.into_inner()).unwrap()
    }

    fn all_on() -> ProcessingOptions {
        ProcessingOptions {
            geocode: true,
            show_coordinates: true,
            show_datetimes: true,
            ..ProcessingOptions::default()
        }
    }

    // =========================================================================
    // convert_dms_to_dd
    // =========================================================================

    #[test]
    fn dms_north_is_positive() {
        assert_eq!(convert_dms_to_dd(40.0, 30.0, 0.0, "N"), 40.5);
    }

    #[test]
    fn dms_south_is_negative() {
        assert_eq!(convert_dms_to_dd(40.0, 30.0, 0.0, "S"), -40.5);
    }

    #[test]
    fn dms_west_is_negative_east_positive() {
        assert!((convert_dms_to_dd(10.0, 0.0, 36.0, "W") + 10.01).abs() < 1e-9);
        assert!((convert_dms_to_dd(10.0, 0.0, 36.0, "E") - 10.01).abs() < 1e-9);
    }

    // =========================================================================
    // Tag readers
    // =========================================================================

    #[test]
    fn capture_time_drops_zone_suffix() {
        let exif = sample_exif(vec![]);
        assert_eq!(
            date_time_original(&exif).as_deref(),
            Some("2023-07-14T18:05:09")
        );
    }

    #[test]
    fn invalid_capture_time_is_ignored() {
        let exif = Reader::new()
            .read_raw({
                let f = ascii(Tag::DateTimeOriginal, "2023:13:40 99:00:00");
                let mut w = Writer::new();
                w.push_field(&f);
                let mut buf = Cursor::new(Vec::new());
                w.write(&mut buf, false).unwrap();
                buf.into_inner()
            })
            .unwrap();
        assert_eq!(date_time_original(&exif), None);
    }

    #[test]
    fn coordinates_are_signed_decimal_degrees() {
        let exif = sample_exif(vec![]);
        let (lat, lon) = coordinates(&exif).unwrap();
        assert!((lat - 52.3791666).abs() < 1e-6, "lat {lat}");
        assert!((lon - 4.9).abs() < 1e-9, "lon {lon}");
    }

    #[test]
    fn orientation_reads_primary_tag() {
        let exif = sample_exif(vec![Field {
            tag: Tag::Orientation,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![6]),
        }]);
        assert_eq!(orientation(Some(&exif)), Some(6));
        assert_eq!(orientation(None), None);
    }

    #[test]
    fn non_image_bytes_have_no_exif() {
        assert!(read_exif(b"plain text").is_none());
    }

    // =========================================================================
    // extract_metadata
    // =========================================================================

    #[test]
    fn all_options_fill_every_field() {
        let exif = sample_exif(vec![]);
        let summary = extract_metadata(Some(&exif), &all_on(), &FixedGeoResolver::place("Amsterdam"));

        assert_eq!(summary.date_time_original.as_deref(), Some("2023-07-14T18:05:09"));
        assert!(summary.latitude.is_some());
        assert!(summary.longitude.is_some());
        assert_eq!(summary.geodata.unwrap().name, "Amsterdam");
    }

    #[test]
    fn hidden_coordinates_still_geocode() {
        let exif = sample_exif(vec![]);
        let options = ProcessingOptions {
            show_coordinates: false,
            ..all_on()
        };
        let summary = extract_metadata(Some(&exif), &options, &FixedGeoResolver::place("Amsterdam"));
        assert_eq!(summary.latitude, None);
        assert_eq!(summary.longitude, None);
        assert!(summary.geodata.is_some());
    }

    #[test]
    fn geocode_off_skips_resolver() {
        let exif = sample_exif(vec![]);
        let options = ProcessingOptions {
            geocode: false,
            ..all_on()
        };
        let summary = extract_metadata(Some(&exif), &options, &FixedGeoResolver::place("X"));
        assert!(summary.geodata.is_none());
        assert!(summary.latitude.is_some());
    }

    #[test]
    fn hidden_datetimes_are_omitted() {
        let exif = sample_exif(vec![]);
        let options = ProcessingOptions {
            show_datetimes: false,
            ..all_on()
        };
        let summary = extract_metadata(Some(&exif), &options, &FixedGeoResolver(None));
        assert_eq!(summary.date_time_original, None);
    }

    #[test]
    fn missing_exif_yields_empty_summary() {
        let summary = extract_metadata(None, &all_on(), &FixedGeoResolver::place("X"));
        assert_eq!(summary, ExifSummary::default());
    }

    #[test]
    fn failed_resolution_omits_geodata() {
        let exif = sample_exif(vec![]);
        let summary = extract_metadata(Some(&exif), &all_on(), &FixedGeoResolver(None));
        assert!(summary.geodata.is_none());
        assert!(summary.latitude.is_some());
    }
}
