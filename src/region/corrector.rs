//! Administrative label repair.
//!
//! Runs over enriched records in a fixed order:
//!
//! 1. A trusted county whose name is unique in the country rewrites a disagreeing province.
//! 2. Records whose point lies in their province's box are left alone.
//! 3. Otherwise the point decides: when exactly one province box contains it, that province
//!    is adopted and the county is checked against it. Zero or several containing boxes
//!    produce a review item and no change.
//!
//! Correcting an already corrected record changes nothing.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::validator::RegionValidator;
use crate::geocode::{canonical_province, GeocodingProvider, Resolver};
use crate::models::{AdminLabel, Coordinates, EnrichedRecord};
use crate::reference::{CountyLookup, CountyProvinceMapping};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    /// The point lies in no province box
    NoContainingRegion,
    /// The point lies in several overlapping boxes
    AmbiguousRegion { candidates: Vec<String> },
    /// The province was adopted but the county is not in the mapping
    UnmappedCounty { county: String },
}

impl ReviewReason {
    pub fn code(&self) -> &'static str {
        match self {
            ReviewReason::NoContainingRegion => "no_containing_region",
            ReviewReason::AmbiguousRegion { .. } => "ambiguous_region",
            ReviewReason::UnmappedCounty { .. } => "unmapped_county",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ReviewReason::NoContainingRegion => String::new(),
            ReviewReason::AmbiguousRegion { candidates } => candidates.join("|"),
            ReviewReason::UnmappedCounty { county } => county.clone(),
        }
    }
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewReason::NoContainingRegion => write!(f, "point lies in no province"),
            ReviewReason::AmbiguousRegion { candidates } => {
                write!(f, "point lies in several provinces: {}", candidates.join(", "))
            }
            ReviewReason::UnmappedCounty { county } => {
                write!(f, "county {} is not in the county mapping", county)
            }
        }
    }
}

/// A record that needs a human decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub record_id: String,
    pub city: String,
    pub coordinates: Coordinates,
    pub province: AdminLabel,
    pub county: AdminLabel,
    pub reason: ReviewReason,
}

/// One modification applied to a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    ProvinceFromCounty { from: AdminLabel, to: String, county: String },
    ProvinceFromPoint { from: AdminLabel, to: String },
    CountyCleared { county: String },
    Relocated { from: Coordinates, to: Coordinates },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub record: EnrichedRecord,
    pub changes: Vec<Change>,
    pub review: Option<ReviewItem>,
}

impl CorrectionOutcome {
    pub fn is_changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

pub struct RegionCorrector {
    validator: Arc<RegionValidator>,
}

impl RegionCorrector {
    pub fn new(validator: Arc<RegionValidator>) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &RegionValidator {
        &self.validator
    }

    fn counties(&self) -> &CountyProvinceMapping {
        self.validator.reference().counties()
    }

    /// Correct one record from its labels and point alone.
    pub fn correct(&self, record: EnrichedRecord) -> CorrectionOutcome {
        let mut outcome = CorrectionOutcome {
            record,
            changes: Vec::new(),
            review: None,
        };

        self.repair_province_from_county(&mut outcome);
        if self.is_valid(&outcome.record) {
            return outcome;
        }

        // Labels and point still disagree: let the point decide
        self.correct_from_point(&mut outcome);
        outcome
    }

    /// As [`correct`](Self::correct), but records that fail validation and came from a name
    /// match are first re-geocoded inside their recorded province.
    pub async fn correct_with_resolver<P: GeocodingProvider>(
        &self,
        record: EnrichedRecord,
        resolver: &Resolver<P>,
    ) -> CorrectionOutcome {
        let mut outcome = CorrectionOutcome {
            record,
            changes: Vec::new(),
            review: None,
        };

        self.repair_province_from_county(&mut outcome);
        if self.is_valid(&outcome.record) {
            return outcome;
        }

        let reresolvable = outcome.record.tier.is_some_and(|t| t.is_reresolvable());
        if reresolvable {
            if let Some(region) = self.validator.region_for(&outcome.record.province).cloned() {
                let query = outcome.record.to_query();
                let key = outcome.record.cache_key();
                if let Some(resolved) = resolver.resolve_within(&query, &key, &region).await {
                    debug!(
                        "Re-geocoded {} inside {}: {} -> {}",
                        outcome.record.record_id,
                        region.name,
                        outcome.record.coordinates,
                        resolved.coordinates
                    );
                    outcome.changes.push(Change::Relocated {
                        from: outcome.record.coordinates,
                        to: resolved.coordinates,
                    });
                    outcome.record.coordinates = resolved.coordinates;
                    outcome.record.tier = Some(resolved.tier);
                    outcome.record.municipality = resolved.municipality;
                    return outcome;
                }
            }
        }

        self.correct_from_point(&mut outcome);
        outcome
    }

    fn is_valid(&self, record: &EnrichedRecord) -> bool {
        self.validator.is_valid(record.coordinates, &record.province)
    }

    fn repair_province_from_county(&self, outcome: &mut CorrectionOutcome) {
        let record = &mut outcome.record;
        if record.county_inferred {
            return;
        }
        let Some(county) = record.county.as_known() else {
            return;
        };
        let Some(mapped) = self.counties().province_of(county) else {
            return;
        };

        let recorded = record.province.as_known().and_then(canonical_province);
        if recorded.as_deref() == Some(mapped) {
            return;
        }

        info!(
            "{}: county {} belongs to {}, was {}",
            record.record_id, county, mapped, record.province
        );
        outcome.changes.push(Change::ProvinceFromCounty {
            from: record.province.clone(),
            to: mapped.to_string(),
            county: county.to_string(),
        });
        record.province = AdminLabel::known(mapped);
    }

    fn correct_from_point(&self, outcome: &mut CorrectionOutcome) {
        let containing = self.validator.containing_regions(outcome.record.coordinates);

        let region = match containing.as_slice() {
            [] => {
                outcome.review = Some(self.review(&outcome.record, ReviewReason::NoContainingRegion));
                return;
            }
            [only] => Arc::clone(only),
            several => {
                let candidates = several.iter().map(|r| r.name.clone()).collect();
                outcome.review = Some(self.review(
                    &outcome.record,
                    ReviewReason::AmbiguousRegion { candidates },
                ));
                return;
            }
        };

        let record = &mut outcome.record;
        info!(
            "{}: point {} lies in {}, was {}",
            record.record_id, record.coordinates, region.name, record.province
        );
        outcome.changes.push(Change::ProvinceFromPoint {
            from: record.province.clone(),
            to: region.name.clone(),
        });
        record.province = AdminLabel::known(region.name.clone());

        let Some(county) = record.county.as_known().map(str::to_string) else {
            return;
        };

        let counties = self.validator.reference().counties();
        if counties.contains_pair(&county, &region.name) {
            return;
        }

        match counties.lookup(&county) {
            CountyLookup::Absent => {
                outcome.review = Some(self.review(
                    &outcome.record,
                    ReviewReason::UnmappedCounty { county },
                ));
            }
            CountyLookup::Unique(_) | CountyLookup::Ambiguous(_) => {
                debug!(
                    "{}: county {} is not in {}, clearing",
                    record.record_id, county, region.name
                );
                outcome.changes.push(Change::CountyCleared { county });
                record.county = AdminLabel::Unknown;
                record.county_inferred = false;
            }
        }
    }

    fn review(&self, record: &EnrichedRecord, reason: ReviewReason) -> ReviewItem {
        ReviewItem {
            record_id: record.record_id.clone(),
            city: record.city.clone(),
            coordinates: record.coordinates,
            province: record.province.clone(),
            county: record.county.clone(),
            reason,
        }
    }
}
