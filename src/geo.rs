//! Reverse geocoding of photo coordinates into place names.
//!
//! The production resolver is fully offline: `reverse_geocoder` ships the
//! GeoNames cities table and answers nearest-city queries from a k-d tree.
//! Building that tree takes a moment, so [`OfflineGeocoder`] defers it to the
//! first lookup and reuses it for the rest of the run.

use reverse_geocoder::ReverseGeocoder;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Place hierarchy for a coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoData {
    pub name: String,
    pub admin1: String,
    pub admin2: String,
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Resolves decimal coordinates to a place. `None` means "unknown here".
pub trait GeoResolver: Sync {
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<GeoData>;
}

/// Nearest-city lookup against the embedded GeoNames table.
#[derive(Default)]
pub struct OfflineGeocoder {
    index: OnceLock<ReverseGeocoder>,
}

impl OfflineGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self) -> &ReverseGeocoder {
        self.index.get_or_init(|| {
            tracing::debug!("building reverse geocoding index");
            ReverseGeocoder::new()
        })
    }
}

impl GeoResolver for OfflineGeocoder {
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<GeoData> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        let record = self.index().search((latitude, longitude)).record;
        let country = rust_iso3166::from_alpha2(&record.cc).map(|c| c.name.to_string());
        Some(GeoData {
            name: record.name.clone(),
            admin1: record.admin1.clone(),
            admin2: record.admin2.clone(),
            country_code: record.cc.clone(),
            country,
        })
    }
}
