//! Locus - location resolution and administrative correction for Polish
//! energy-market registries.
//!
//! This library provides the shared types and modules for the ingest and serve binaries.

pub mod config;
pub mod error;
pub mod geocode;
pub mod models;
pub mod pipeline;
pub mod reference;
pub mod region;

pub use geocode::{GeocodeCache, RateLimiter, Resolver};
pub use models::{AdminLabel, Coordinates, LocationQuery, ResolvedLocation, Tier};
pub use reference::ReferenceData;
pub use region::{RegionCorrector, RegionValidator};
