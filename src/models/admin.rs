//! Administrative region types used for validation and correction.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Coordinates;

/// Axis-aligned bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, coords: Coordinates) -> bool {
        coords.lat >= self.min_lat
            && coords.lat <= self.max_lat
            && coords.lon >= self.min_lon
            && coords.lon <= self.max_lon
    }

    /// Convert to a geo rectangle (x = lon, y = lat).
    pub fn to_rect(&self) -> geo::Rect<f64> {
        geo::Rect::new(
            geo::coord! { x: self.min_lon, y: self.min_lat },
            geo::coord! { x: self.max_lon, y: self.max_lat },
        )
    }

    /// Nominatim `viewbox` parameter: left,top,right,bottom.
    pub fn to_viewbox(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.max_lat, self.max_lon, self.min_lat
        )
    }

    /// Nearest point inside the box.
    pub fn clamp(&self, coords: Coordinates) -> Coordinates {
        Coordinates::new(
            coords.lat.clamp(self.min_lat, self.max_lat),
            coords.lon.clamp(self.min_lon, self.max_lon),
        )
    }

    pub fn is_well_formed(&self) -> bool {
        self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
            && (-90.0..=90.0).contains(&self.min_lat)
            && (-90.0..=90.0).contains(&self.max_lat)
            && (-180.0..=180.0).contains(&self.min_lon)
            && (-180.0..=180.0).contains(&self.max_lon)
    }
}

/// A province (województwo) with its coarse bounding box and representative centre.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdministrativeRegion {
    /// Canonical lowercase name, e.g. "dolnośląskie"
    pub name: String,

    /// Bounding box
    pub bbox: BoundingBox,

    /// Centroid used for the province fallback tier
    pub centroid: Coordinates,
}

impl AdministrativeRegion {
    pub fn new(name: impl Into<String>, bbox: BoundingBox, centroid: Coordinates) -> Self {
        Self {
            name: name.into(),
            bbox,
            centroid,
        }
    }

    pub fn contains(&self, coords: Coordinates) -> bool {
        self.bbox.contains(coords)
    }
}

/// A province or county label that may be unknown.
///
/// Serialized as the plain name; `Unknown` is written as `"unknown"`. The Polish
/// placeholders used by the registries (`nieznany`, `nieznana`) and empty strings are
/// read back as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AdminLabel {
    Known(String),
    #[default]
    Unknown,
}

impl AdminLabel {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn known(name: impl Into<String>) -> Self {
        AdminLabel::from(name.into())
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            AdminLabel::Known(name) => Some(name),
            AdminLabel::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, AdminLabel::Known(_))
    }
}

impl From<String> for AdminLabel {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "unknown" | "nieznany" | "nieznana" => AdminLabel::Unknown,
            _ => AdminLabel::Known(trimmed.to_string()),
        }
    }
}

impl From<Option<String>> for AdminLabel {
    fn from(value: Option<String>) -> Self {
        value.map(AdminLabel::from).unwrap_or_default()
    }
}

impl From<AdminLabel> for String {
    fn from(label: AdminLabel) -> Self {
        match label {
            AdminLabel::Known(name) => name,
            AdminLabel::Unknown => AdminLabel::UNKNOWN.to_string(),
        }
    }
}

impl fmt::Display for AdminLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminLabel::Known(name) => write!(f, "{}", name),
            AdminLabel::Unknown => write!(f, "{}", AdminLabel::UNKNOWN),
        }
    }
}
