//! Query and result types for location resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::AdminLabel;

/// Geographic point. Serialized as `[lat, lon]`, the shape the map layer consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn to_point(self) -> geo_types::Point<f64> {
        geo_types::Point::new(self.lon, self.lat)
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lat, c.lon]
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.lat, self.lon)
    }
}

/// Confidence tier of a resolved location, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Normalized city found verbatim in the curated dictionary
    ExactDictionary,
    /// Dictionary key and city share a substring
    PartialDictionary,
    /// Answered by the external geocoder
    ExternalProvider,
    /// Centroid of the recorded province
    ProvinceCentroid,
    /// Country centre
    GlobalDefault,
}

impl Tier {
    pub fn all() -> &'static [Tier] {
        &[
            Tier::ExactDictionary,
            Tier::PartialDictionary,
            Tier::ExternalProvider,
            Tier::ProvinceCentroid,
            Tier::GlobalDefault,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::ExactDictionary => "exact_dictionary",
            Tier::PartialDictionary => "partial_dictionary",
            Tier::ExternalProvider => "external_provider",
            Tier::ProvinceCentroid => "province_centroid",
            Tier::GlobalDefault => "global_default",
        }
    }

    /// Tiers whose coordinates came from a name match that may have picked the wrong
    /// settlement, and are therefore worth re-resolving when they fail validation.
    pub fn is_reresolvable(&self) -> bool {
        matches!(self, Tier::PartialDictionary | Tier::ExternalProvider)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to resolution. Built once per ingested record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    pub raw_city: String,
    pub raw_province: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_county: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub postal_code: String,
    pub record_id: String,
}

impl LocationQuery {
    pub fn new(
        record_id: impl Into<String>,
        raw_city: impl Into<String>,
        raw_province: impl Into<String>,
    ) -> Self {
        Self {
            raw_city: raw_city.into(),
            raw_province: raw_province.into(),
            raw_county: None,
            address: String::new(),
            postal_code: String::new(),
            record_id: record_id.into(),
        }
    }

    pub fn with_county(mut self, county: impl Into<String>) -> Self {
        self.raw_county = Some(county.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>, postal_code: impl Into<String>) -> Self {
        self.address = address.into();
        self.postal_code = postal_code.into();
        self
    }

    /// Composite cache key. Any change in these inputs invalidates the cached entry.
    pub fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.record_id, self.raw_city, self.raw_province, self.address, self.postal_code
        )
    }
}

/// Output of resolution. `coordinates` is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub coordinates: Coordinates,
    pub tier: Tier,
    pub province: AdminLabel,
    pub county: AdminLabel,
    /// Municipality (gmina) recorded with the cache entry; unknown until looked up
    #[serde(default)]
    pub municipality: AdminLabel,
    /// County label came from the name-suffix heuristic and must not drive repairs
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub county_inferred: bool,
}
