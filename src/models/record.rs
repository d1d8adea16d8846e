//! Registry records as they enter and leave the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AdminLabel, Coordinates, LocationQuery, ResolvedLocation, Tier};

/// Record produced by the XML conversion step.
///
/// Only the location fields are interpreted; everything else is carried through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(alias = "id")]
    pub record_id: String,

    #[serde(default)]
    pub city: String,

    #[serde(default)]
    pub province: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub postal_code: String,

    /// Registry-specific fields (name, power, dates, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawRecord {
    pub fn to_query(&self) -> LocationQuery {
        LocationQuery {
            raw_city: self.city.clone(),
            raw_province: self.province.clone(),
            raw_county: self.county.clone().filter(|c| !c.trim().is_empty()),
            address: self.address.clone(),
            postal_code: self.postal_code.clone(),
            record_id: self.record_id.clone(),
        }
    }

    pub fn enrich(self, resolved: ResolvedLocation) -> EnrichedRecord {
        let cache_key = self.to_query().cache_key();
        EnrichedRecord {
            record_id: self.record_id,
            city: self.city,
            address: self.address,
            postal_code: self.postal_code,
            coordinates: resolved.coordinates,
            province: resolved.province,
            county: resolved.county,
            municipality: resolved.municipality,
            tier: Some(resolved.tier),
            county_inferred: resolved.county_inferred,
            cache_key: Some(cache_key),
            extra: self.extra,
        }
    }
}

/// Record handed to the presentation layer, and the unit the correction pass works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    #[serde(alias = "id")]
    pub record_id: String,

    #[serde(default)]
    pub city: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub postal_code: String,

    pub coordinates: Coordinates,

    #[serde(default)]
    pub province: AdminLabel,

    #[serde(default)]
    pub county: AdminLabel,

    #[serde(default)]
    pub municipality: AdminLabel,

    /// Absent on records enriched by older tooling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub county_inferred: bool,

    /// Key of the cache entry the resolve pass wrote for this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnrichedRecord {
    /// The cache entry behind this record. Records enriched by older tooling carry no key;
    /// it is rebuilt from their current fields.
    pub fn cache_key(&self) -> String {
        self.cache_key
            .clone()
            .unwrap_or_else(|| self.to_query().cache_key())
    }

    /// Rebuild the query that produced this record, for re-resolution.
    pub fn to_query(&self) -> LocationQuery {
        LocationQuery {
            raw_city: self.city.clone(),
            raw_province: self.province.to_string(),
            raw_county: self.county.as_known().map(str::to_string),
            address: self.address.clone(),
            postal_code: self.postal_code.clone(),
            record_id: self.record_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_keeps_unknown_fields() {
        let json = r#"{
            "id": "MIOZE_1_2",
            "city": "Żarów",
            "province": "dolnośląskie",
            "address": "ul. Słowackiego 1",
            "postalCode": "58-130",
            "name": "Elektrownia PV",
            "power": 0.99
        }"#;
        let raw: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(raw.record_id, "MIOZE_1_2");
        assert_eq!(raw.extra.get("power"), Some(&serde_json::json!(0.99)));

        let query = raw.to_query();
        assert_eq!(query.raw_county, None);
        assert_eq!(query.postal_code, "58-130");
    }

    #[test]
    fn test_enriched_record_shape() {
        let raw: RawRecord =
            serde_json::from_str(r#"{"recordId": "A", "city": "Kozienice", "name": "x"}"#)
                .unwrap();
        let enriched = raw.enrich(ResolvedLocation {
            coordinates: Coordinates::new(51.58, 21.55),
            tier: Tier::ExternalProvider,
            province: AdminLabel::known("mazowieckie"),
            county: AdminLabel::Unknown,
            municipality: AdminLabel::known("Kozienice"),
            county_inferred: false,
        });

        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["coordinates"], serde_json::json!([51.58, 21.55]));
        assert_eq!(value["county"], "unknown");
        assert_eq!(value["tier"], "external_provider");
        assert_eq!(value["name"], "x");
        assert_eq!(value["municipality"], "Kozienice");
        assert_eq!(value["cacheKey"], "A_Kozienice___");
        assert!(value.get("countyInferred").is_none());
    }

    #[test]
    fn test_cache_key_survives_label_corrections() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "id": "X9",
            "city": "Żarów",
            "province": "Województwo Dolnośląskie",
            "postalCode": "58-130"
        }))
        .unwrap();
        let original_key = raw.to_query().cache_key();

        let mut enriched = raw.enrich(ResolvedLocation {
            coordinates: Coordinates::new(52.23, 21.01),
            tier: Tier::ExternalProvider,
            province: AdminLabel::known("dolnośląskie"),
            county: AdminLabel::Unknown,
            municipality: AdminLabel::Unknown,
            county_inferred: false,
        });
        enriched.province = AdminLabel::known("mazowieckie");

        assert_eq!(enriched.cache_key(), original_key);
        assert_eq!(original_key, "X9_Żarów_Województwo Dolnośląskie__58-130");

        enriched.cache_key = None;
        assert_eq!(enriched.cache_key(), "X9_Żarów_mazowieckie__58-130");
    }
}
