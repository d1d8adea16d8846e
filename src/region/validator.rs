//! Bounding-box consistency checks.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::index::RegionIndex;
use crate::geocode::canonical_province;
use crate::models::{AdminLabel, AdministrativeRegion, Coordinates, EnrichedRecord, Tier};
use crate::reference::ReferenceData;

pub struct RegionValidator {
    reference: Arc<ReferenceData>,
    index: RegionIndex,
}

/// A record whose point lies outside its recorded province.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub record_id: String,
    pub city: String,
    pub coordinates: Coordinates,
    /// Provinces whose boxes do contain the point
    pub containing: Vec<String>,
}

/// Summary of a validation sweep over enriched records.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub total: usize,
    /// Records with a recognized province (the others always pass)
    pub checked: usize,
    pub by_tier: BTreeMap<String, usize>,
    /// Recorded province → violations
    pub violations: BTreeMap<String, Vec<Violation>>,
}

impl AuditReport {
    pub fn violation_count(&self) -> usize {
        self.violations.values().map(Vec::len).sum()
    }
}

impl RegionValidator {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        let index = RegionIndex::build(reference.regions().to_vec());
        Self { reference, index }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// The reference region a province label refers to, if recognized.
    pub fn region_for(&self, province: &AdminLabel) -> Option<&AdministrativeRegion> {
        let name = canonical_province(province.as_known()?)?;
        self.reference.region(&name)
    }

    /// Whether `coords` lies in the box of `province`. Unknown or unrecognized provinces
    /// always pass.
    pub fn is_valid(&self, coords: Coordinates, province: &AdminLabel) -> bool {
        match self.region_for(province) {
            Some(region) => region.contains(coords),
            None => true,
        }
    }

    pub fn containing_regions(&self, coords: Coordinates) -> Vec<Arc<AdministrativeRegion>> {
        self.index.lookup(coords)
    }

    pub fn audit<'a>(&self, records: impl IntoIterator<Item = &'a EnrichedRecord>) -> AuditReport {
        let mut report = AuditReport::default();

        for record in records {
            report.total += 1;
            let tier = record.tier.map(|t| t.as_str()).unwrap_or("untagged");
            *report.by_tier.entry(tier.to_string()).or_default() += 1;

            let Some(region) = self.region_for(&record.province) else {
                continue;
            };
            report.checked += 1;

            if region.contains(record.coordinates) {
                continue;
            }

            report
                .violations
                .entry(region.name.clone())
                .or_default()
                .push(Violation {
                    record_id: record.record_id.clone(),
                    city: record.city.clone(),
                    coordinates: record.coordinates,
                    containing: self
                        .containing_regions(record.coordinates)
                        .iter()
                        .map(|r| r.name.clone())
                        .collect(),
                });
        }

        report
    }
}

/// Tiers in the order the audit summary lists them.
pub fn tier_order() -> impl Iterator<Item = &'static str> {
    Tier::all().iter().map(Tier::as_str).chain(std::iter::once("untagged"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn validator() -> RegionValidator {
        RegionValidator::new(Arc::new(ReferenceData::embedded().unwrap()))
    }

    fn record(id: &str, lat: f64, lon: f64, province: &str) -> EnrichedRecord {
        EnrichedRecord {
            record_id: id.to_string(),
            city: "Test".to_string(),
            address: String::new(),
            postal_code: String::new(),
            coordinates: Coordinates::new(lat, lon),
            province: AdminLabel::known(province),
            county: AdminLabel::Unknown,
            tier: Some(Tier::ExternalProvider),
            municipality: AdminLabel::Unknown,
            county_inferred: false,
            cache_key: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_inside_and_outside() {
        let v = validator();
        let province = AdminLabel::known("dolnośląskie");
        assert!(v.is_valid(Coordinates::new(50.9413, 16.4951), &province));
        assert!(!v.is_valid(Coordinates::new(52.2297, 21.0122), &province));
    }

    #[test]
    fn test_unknown_province_passes() {
        let v = validator();
        let far = Coordinates::new(0.0, 0.0);
        assert!(v.is_valid(far, &AdminLabel::Unknown));
        assert!(v.is_valid(far, &AdminLabel::known("atlantyda")));
    }

    #[test]
    fn test_prefixed_province_is_recognized() {
        let v = validator();
        let province = AdminLabel::known("Województwo Dolnośląskie");
        assert!(!v.is_valid(Coordinates::new(52.2297, 21.0122), &province));
    }

    #[test]
    fn test_audit_groups_by_province() {
        let v = validator();
        let records = vec![
            record("A", 50.94, 16.49, "dolnośląskie"),
            record("B", 52.5, 21.0, "dolnośląskie"),
            record("C", 52.5, 21.0, "nieznany"),
        ];
        let report = v.audit(&records);

        assert_eq!(report.total, 3);
        assert_eq!(report.checked, 2);
        assert_eq!(report.violation_count(), 1);
        let violations = &report.violations["dolnośląskie"];
        assert_eq!(violations[0].record_id, "B");
        assert_eq!(violations[0].containing, vec!["mazowieckie".to_string()]);
        assert_eq!(report.by_tier["external_provider"], 3);
    }
}
