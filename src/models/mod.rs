//! Core data models for the location pipeline.

pub mod admin;
pub mod location;
pub mod record;

pub use admin::{AdminLabel, AdministrativeRegion, BoundingBox};
pub use location::{Coordinates, LocationQuery, ResolvedLocation, Tier};
pub use record::{EnrichedRecord, RawRecord};
