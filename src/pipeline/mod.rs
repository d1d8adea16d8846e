//! Batch driver: resolve, correct, audit and municipality passes.

mod correct;
mod municipality;
mod records;
mod report;
mod resolve;

pub use correct::{log_audit, CorrectionSummary};
pub use municipality::MunicipalitySummary;
pub use records::{plan_jobs, read_records, write_records, FileJob};
pub use report::write_review_csv;
pub use resolve::ResolveSummary;

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::geocode::{GeocodeCache, GeocodingProvider, NominatimClient, RateLimiter, Resolver, SearchSettings};
use crate::reference::ReferenceData;
use crate::region::{RegionCorrector, RegionValidator};

/// Run `job`, then flush `cache` whatever the job's outcome.
///
/// A job error takes precedence over a flush error; the flush error is then only logged.
pub async fn with_flushed_cache<F, Fut, T>(cache: &GeocodeCache, job: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let result = job().await;
    let flushed = cache
        .flush()
        .with_context(|| format!("Failed to flush cache to {}", cache.path().display()));

    match (result, flushed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(flush_err)) => Err(flush_err),
        (Err(job_err), Ok(())) => Err(job_err),
        (Err(job_err), Err(flush_err)) => {
            warn!("{:#}", flush_err);
            Err(job_err)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Resolutions in flight at once
    pub concurrency: usize,
    /// Flush the cache after this many resolved records
    pub flush_every: usize,
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            flush_every: 100,
            show_progress: false,
        }
    }
}

/// Everything a pass needs, wired once per process.
pub struct Pipeline<P> {
    reference: Arc<ReferenceData>,
    cache: Arc<GeocodeCache>,
    resolver: Arc<Resolver<P>>,
    validator: Arc<RegionValidator>,
    corrector: RegionCorrector,
    settings: PipelineSettings,
}

impl Pipeline<NominatimClient> {
    /// Load reference data and the cache and build the Nominatim-backed resolver.
    pub fn from_config(config: &Config) -> Result<Self> {
        // Static tables, then the persisted cache; both are fatal when unreadable
        let reference = Arc::new(
            ReferenceData::load(config.reference.file.as_deref())
                .context("Failed to load reference data")?,
        );
        let cache = Arc::new(
            GeocodeCache::load(&config.cache.path).context("Failed to load geocode cache")?,
        );

        // One limiter for every external call this process makes
        let limiter = Arc::new(RateLimiter::new(config.provider.interval()));

        let provider = if config.provider.enabled {
            info!(
                "Geocoder: {} (one request per {} ms)",
                config.provider.url, config.provider.interval_ms
            );
            Some(NominatimClient::new(&config.provider).context("Failed to create geocoder client")?)
        } else {
            info!("External geocoder disabled, resolving offline");
            None
        };

        let resolver = Resolver::new(
            Arc::clone(&reference),
            Arc::clone(&cache),
            limiter,
            provider,
            SearchSettings::from(&config.provider),
        );

        Ok(Self::new(
            reference,
            cache,
            Arc::new(resolver),
            PipelineSettings {
                concurrency: config.resolver.concurrency,
                flush_every: config.cache.flush_every,
                show_progress: false,
            },
        ))
    }
}

impl<P: GeocodingProvider> Pipeline<P> {
    pub fn new(
        reference: Arc<ReferenceData>,
        cache: Arc<GeocodeCache>,
        resolver: Arc<Resolver<P>>,
        settings: PipelineSettings,
    ) -> Self {
        let validator = Arc::new(RegionValidator::new(Arc::clone(&reference)));
        let corrector = RegionCorrector::new(Arc::clone(&validator));
        Self {
            reference,
            cache,
            resolver,
            validator,
            corrector,
            settings,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.settings.show_progress = show;
        self
    }

    pub fn reference(&self) -> &Arc<ReferenceData> {
        &self.reference
    }

    pub fn cache(&self) -> &Arc<GeocodeCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<Resolver<P>> {
        &self.resolver
    }

    pub fn validator(&self) -> &Arc<RegionValidator> {
        &self.validator
    }

    pub fn corrector(&self) -> &RegionCorrector {
        &self.corrector
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}
