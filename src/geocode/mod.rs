//! Coordinate resolution for registry records.
//!
//! A [`Resolver`] walks the tiers (cache, dictionary, external provider, fallbacks), going
//! through the shared [`RateLimiter`] for every external call and writing every answer,
//! jittered, into the [`GeocodeCache`].

pub mod cache;
pub mod jitter;
pub mod limiter;
pub mod normalize;
pub mod provider;
pub mod resolver;

pub use cache::{CacheEntry, GeocodeCache, LEGACY_TIER};
pub use jitter::jitter;
pub use limiter::RateLimiter;
pub use normalize::{canonical_province, municipality_label, NameNormalizer};
pub use provider::{Candidate, GeocodingProvider, NominatimClient, ProviderQuery};
pub use resolver::{Resolver, SearchSettings};
