//! Administrative reference data: province boxes and centroids, the curated city
//! dictionary, name variants and the county → province mapping.
//!
//! The tables are embedded in the binary and can be extended by an optional JSON file.
//! They are loaded once at startup and never mutated afterwards.

mod counties;
mod dictionary;

pub use counties::{
    canonical_county, infer_county_name, CountyLookup, CountyProvinceMapping, CountyProvincePair,
};
pub use dictionary::{CityDictionary, DictionaryEntry, DictionaryMatch};

use hashbrown::HashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::ReferenceError;
use crate::models::{AdministrativeRegion, Coordinates};

const REGIONS_JSON: &str = include_str!("data/regions.json");
const CITIES_JSON: &str = include_str!("data/cities.json");
const COUNTIES_JSON: &str = include_str!("data/counties.json");
const VARIANTS_JSON: &str = include_str!("data/variants.json");

/// Geometric centre of Poland, used when nothing better is known.
pub const COUNTRY_CENTER: Coordinates = Coordinates::new(52.0690, 19.4803);

/// Extension document accepted by [`ReferenceData::load`]. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceOverrides {
    pub regions: Vec<AdministrativeRegion>,
    pub cities: Vec<DictionaryEntry>,
    pub counties: Vec<CountyProvincePair>,
    pub variants: HashMap<String, String>,
}

/// All static tables the resolver and the corrector consult.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    regions: Vec<AdministrativeRegion>,
    dictionary: CityDictionary,
    counties: CountyProvinceMapping,
    variants: HashMap<String, String>,
}

impl ReferenceData {
    /// Embedded tables only.
    pub fn embedded() -> Result<Self, ReferenceError> {
        let regions: Vec<AdministrativeRegion> = parse("regions.json", REGIONS_JSON)?;
        let cities: Vec<DictionaryEntry> = parse("cities.json", CITIES_JSON)?;
        let pairs: Vec<CountyProvincePair> = parse("counties.json", COUNTIES_JSON)?;
        let variants: HashMap<String, String> = parse("variants.json", VARIANTS_JSON)?;

        let data = Self {
            regions,
            dictionary: CityDictionary::new(cities),
            counties: CountyProvinceMapping::from_pairs(pairs),
            variants,
        };
        data.validate()?;
        Ok(data)
    }

    /// Embedded tables extended by `overrides_path` when given.
    pub fn load(overrides_path: Option<&Path>) -> Result<Self, ReferenceError> {
        let mut data = Self::embedded()?;

        if let Some(path) = overrides_path {
            info!("Loading reference overrides from {}", path.display());
            let content = fs::read_to_string(path).map_err(|source| ReferenceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let overrides: ReferenceOverrides =
                serde_json::from_str(&content).map_err(|source| ReferenceError::Parse {
                    origin: path.display().to_string(),
                    source,
                })?;
            data.apply(overrides);
            data.validate()?;
        }

        info!(
            "Reference data: {} regions, {} dictionary cities, {} counties, {} name variants",
            data.regions.len(),
            data.dictionary.len(),
            data.counties.len(),
            data.variants.len()
        );

        Ok(data)
    }

    fn apply(&mut self, overrides: ReferenceOverrides) {
        for region in overrides.regions {
            match self.regions.iter_mut().find(|r| r.name == region.name) {
                Some(existing) => *existing = region,
                None => self.regions.push(region),
            }
        }
        for entry in overrides.cities {
            self.dictionary.upsert(entry);
        }
        for pair in overrides.counties {
            self.counties.insert(pair);
        }
        self.variants.extend(overrides.variants);
    }

    fn validate(&self) -> Result<(), ReferenceError> {
        if self.regions.is_empty() {
            return Err(ReferenceError::Invalid("no regions defined".to_string()));
        }
        for region in &self.regions {
            if !region.bbox.is_well_formed() {
                return Err(ReferenceError::Invalid(format!(
                    "region {} has a malformed bounding box",
                    region.name
                )));
            }
            if !region.centroid.is_finite() {
                return Err(ReferenceError::Invalid(format!(
                    "region {} has a non-finite centroid",
                    region.name
                )));
            }
        }
        for entry in self.dictionary.entries() {
            if !entry.coordinates.is_finite() {
                return Err(ReferenceError::Invalid(format!(
                    "dictionary city {} has non-finite coordinates",
                    entry.name
                )));
            }
        }
        for pair in self.counties.pairs() {
            if self.region(&pair.province).is_none() {
                return Err(ReferenceError::Invalid(format!(
                    "county {} maps to unknown province {}",
                    pair.county, pair.province
                )));
            }
        }
        Ok(())
    }

    pub fn regions(&self) -> &[AdministrativeRegion] {
        &self.regions
    }

    /// Look up a region by canonical name.
    pub fn region(&self, name: &str) -> Option<&AdministrativeRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn dictionary(&self) -> &CityDictionary {
        &self.dictionary
    }

    pub fn counties(&self) -> &CountyProvinceMapping {
        &self.counties
    }

    pub fn variants(&self) -> &HashMap<String, String> {
        &self.variants
    }
}

fn parse<T: serde::de::DeserializeOwned>(origin: &str, json: &str) -> Result<T, ReferenceError> {
    serde_json::from_str(json).map_err(|source| ReferenceError::Parse {
        origin: origin.to_string(),
        source,
    })
}
