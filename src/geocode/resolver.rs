//! Tiered location resolution.
//!
//! Order: cache, exact dictionary, partial dictionary, external provider, province
//! centroid, country centre. The first tier that answers wins. Whatever it returns is
//! jittered by record id and written to the cache, so a later lookup with the same query
//! returns the identical point without touching the provider.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::{CacheEntry, GeocodeCache};
use super::jitter::jitter;
use super::limiter::RateLimiter;
use super::normalize::{municipality_label, NameNormalizer};
use super::provider::{Candidate, GeocodingProvider, ProviderQuery};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::models::{AdminLabel, AdministrativeRegion, Coordinates, LocationQuery, ResolvedLocation, Tier};
use crate::reference::{infer_county_name, DictionaryMatch, ReferenceData, COUNTRY_CENTER};

/// Provider call settings the resolver needs.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub country: String,
    pub result_limit: u32,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl From<&ProviderConfig> for SearchSettings {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            country: config.country.clone(),
            result_limit: config.result_limit,
            max_attempts: config.max_attempts,
            retry_backoff: config.retry_backoff(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from(&ProviderConfig::default())
    }
}

/// Labels attached to a resolved point.
#[derive(Debug, Clone, PartialEq)]
struct Labels {
    province: AdminLabel,
    county: AdminLabel,
    municipality: AdminLabel,
    county_inferred: bool,
}

pub struct Resolver<P> {
    reference: Arc<ReferenceData>,
    normalizer: NameNormalizer,
    cache: Arc<GeocodeCache>,
    limiter: Arc<RateLimiter>,
    /// `None` runs offline: the external tier always misses
    provider: Option<P>,
    settings: SearchSettings,
}

impl<P: GeocodingProvider> Resolver<P> {
    pub fn new(
        reference: Arc<ReferenceData>,
        cache: Arc<GeocodeCache>,
        limiter: Arc<RateLimiter>,
        provider: Option<P>,
        settings: SearchSettings,
    ) -> Self {
        let normalizer = NameNormalizer::from_reference(&reference);
        Self {
            reference,
            normalizer,
            cache,
            limiter,
            provider,
            settings,
        }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    pub fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }

    /// Whether external calls are made at all.
    pub fn is_online(&self) -> bool {
        self.provider.is_some()
    }

    /// Resolve a query to coordinates. Never fails; the last tier is the country centre.
    pub async fn resolve(&self, query: &LocationQuery) -> ResolvedLocation {
        let city = self.normalizer.city(&query.raw_city);
        let province = self.normalizer.province(&query.raw_province);
        let dictionary_hit = self.reference.dictionary().lookup(&city);
        let mut labels = self.labels(query, province.as_deref(), dictionary_hit);

        let key = query.cache_key();
        if let Some(entry) = self.cache.get(&key) {
            debug!("Cache hit for {}", query.record_id);
            labels.municipality = entry.municipality.unwrap_or_default();
            return located(entry.coordinates, entry.tier, labels);
        }

        let (base, tier) = self
            .locate(&query.record_id, &city, province.as_deref(), dictionary_hit)
            .await;

        let coordinates = jitter(base, &query.record_id);
        self.cache.put(key, CacheEntry::new(coordinates, tier));
        located(coordinates, tier, labels)
    }

    /// Pick the unjittered base point and the tier that produced it.
    async fn locate(
        &self,
        record_id: &str,
        city: &str,
        province: Option<&str>,
        dictionary_hit: Option<DictionaryMatch<'_>>,
    ) -> (Coordinates, Tier) {
        if let Some(hit) = dictionary_hit {
            debug!(
                "{} matched dictionary entry {} ({})",
                record_id,
                hit.entry().name,
                hit.tier()
            );
            return (hit.entry().coordinates, hit.tier());
        }

        let region = province.and_then(|p| self.reference.region(p));

        if !city.is_empty() {
            if let Some(coords) = self.external(record_id, city, province, region).await {
                return (coords, Tier::ExternalProvider);
            }
        }

        if let Some(region) = region {
            debug!("{} falls back to the {} centroid", record_id, region.name);
            return (region.centroid, Tier::ProvinceCentroid);
        }

        debug!("{} falls back to the country centre", record_id);
        (COUNTRY_CENTER, Tier::GlobalDefault)
    }

    async fn external(
        &self,
        record_id: &str,
        city: &str,
        province: Option<&str>,
        region: Option<&AdministrativeRegion>,
    ) -> Option<Coordinates> {
        let text = match province {
            Some(province) => format!("{}, {}, {}", city, province, self.settings.country),
            None => format!("{}, {}", city, self.settings.country),
        };
        let query = ProviderQuery::new(text, self.settings.result_limit);

        let candidates = match self.search(&query).await? {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Geocoding failed for {} ({}): {}", record_id, query.text, e);
                return None;
            }
        };

        let chosen = prefer_inside(&candidates, region)?;
        debug!("{} geocoded to {}", record_id, chosen.display_name);
        Some(chosen.coordinates)
    }

    async fn search(&self, query: &ProviderQuery) -> Option<Result<Vec<Candidate>, ProviderError>> {
        self.call(|provider| provider.search(query)).await
    }

    /// One logical provider call: every attempt waits for the limiter; transient failures
    /// are retried after a fixed backoff. `None` when running offline.
    async fn call<'a, T, Fut>(
        &'a self,
        request: impl Fn(&'a P) -> Fut,
    ) -> Option<Result<T, ProviderError>>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let provider = self.provider.as_ref()?;
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.limiter.acquire().await;

            match request(provider).await {
                Err(e) if e.is_transient() && attempts < max_attempts => {
                    warn!(
                        "Geocoder request failed (attempt {}/{}): {}",
                        attempts, max_attempts, e
                    );
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
                result => return Some(result),
            }
        }
    }

    /// Reverse-geocode the municipality (gmina) containing `coords`.
    ///
    /// Unknown when offline, when the provider fails, or when it has no address there.
    pub async fn municipality_at(&self, coords: Coordinates) -> AdminLabel {
        match self.call(|provider| provider.reverse(coords)).await {
            Some(Ok(name)) => municipality_label(name.as_deref()),
            Some(Err(e)) => {
                warn!("Reverse geocoding failed for {}: {}", coords, e);
                AdminLabel::Unknown
            }
            None => AdminLabel::Unknown,
        }
    }

    /// Province-bounded re-resolution used by the correction pass.
    ///
    /// Tries progressively looser texts, each restricted to the region's box, and takes the
    /// first candidate inside it. The jittered result is kept inside the box and overwrites
    /// the cache entry under `cache_key`, dropping any municipality recorded for the old point.
    pub async fn resolve_within(
        &self,
        query: &LocationQuery,
        cache_key: &str,
        region: &AdministrativeRegion,
    ) -> Option<ResolvedLocation> {
        let city = self.normalizer.city(&query.raw_city);
        if city.is_empty() {
            return None;
        }

        let country = &self.settings.country;
        let strategies = [
            format!("{}, {}, {}", city, region.name, country),
            format!("{}, {}", city, country),
            city.clone(),
        ];

        for text in strategies {
            let provider_query = ProviderQuery::new(text, self.settings.result_limit)
                .bounded_to(region.bbox);

            let candidates = match self.search(&provider_query).await? {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        "Bounded geocoding failed for {} ({}): {}",
                        query.record_id, provider_query.text, e
                    );
                    continue;
                }
            };

            let Some(found) = candidates.iter().find(|c| region.contains(c.coordinates)) else {
                continue;
            };

            debug!(
                "{} re-geocoded inside {} via {:?}",
                query.record_id, region.name, provider_query.text
            );

            let coordinates = region
                .bbox
                .clamp(jitter(found.coordinates, &query.record_id));
            self.cache
                .put(cache_key, CacheEntry::new(coordinates, Tier::ExternalProvider));

            let dictionary_hit = self.reference.dictionary().lookup(&city);
            let labels = self.labels(query, Some(region.name.as_str()), dictionary_hit);
            return Some(located(coordinates, Tier::ExternalProvider, labels));
        }

        None
    }

    fn labels(
        &self,
        query: &LocationQuery,
        province: Option<&str>,
        dictionary_hit: Option<DictionaryMatch<'_>>,
    ) -> Labels {
        let province = AdminLabel::from(province.map(str::to_string));
        let counties = self.reference.counties();

        let raw_county = query
            .raw_county
            .as_deref()
            .and_then(|raw| self.normalizer.county(raw).map(|c| (raw, c)));

        let (county, county_inferred) = match raw_county {
            Some((_, canonical)) if counties.contains(&canonical) => {
                (AdminLabel::known(canonical), false)
            }
            Some((raw, canonical)) => match infer_county_name(raw).filter(|g| counties.contains(g)) {
                Some(guess) => (AdminLabel::known(guess), true),
                None => (AdminLabel::known(canonical), false),
            },
            None => match dictionary_hit {
                Some(DictionaryMatch::Exact(entry)) => {
                    (AdminLabel::from(entry.county.clone()), false)
                }
                _ => (AdminLabel::Unknown, false),
            },
        };

        Labels {
            province,
            county,
            municipality: AdminLabel::Unknown,
            county_inferred,
        }
    }
}

fn located(coordinates: Coordinates, tier: Tier, labels: Labels) -> ResolvedLocation {
    ResolvedLocation {
        coordinates,
        tier,
        province: labels.province,
        county: labels.county,
        municipality: labels.municipality,
        county_inferred: labels.county_inferred,
    }
}

/// First candidate inside the expected region, otherwise the first candidate.
fn prefer_inside<'a>(
    candidates: &'a [Candidate],
    region: Option<&AdministrativeRegion>,
) -> Option<&'a Candidate> {
    region
        .and_then(|region| candidates.iter().find(|c| region.contains(c.coordinates)))
        .or_else(|| candidates.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers every search from a fixed list and records the query texts.
    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<Vec<Candidate>, ProviderError>>>,
        reverse: Mutex<Vec<Result<Option<String>, ProviderError>>>,
        calls: AtomicUsize,
        queries: Mutex<Vec<ProviderQuery>>,
    }

    impl ScriptedProvider {
        fn with(responses: Vec<Result<Vec<Candidate>, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                ..Self::default()
            }
        }

        fn with_reverse(reverse: Vec<Result<Option<String>, ProviderError>>) -> Self {
            Self {
                reverse: Mutex::new(reverse.into_iter().rev().collect()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl GeocodingProvider for ScriptedProvider {
        async fn search(&self, query: &ProviderQuery) -> Result<Vec<Candidate>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            self.responses.lock().unwrap().pop().unwrap_or(Ok(Vec::new()))
        }

        async fn reverse(&self, _coords: Coordinates) -> Result<Option<String>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reverse.lock().unwrap().pop().unwrap_or(Ok(None))
        }
    }

    fn candidate(lat: f64, lon: f64) -> Candidate {
        Candidate {
            coordinates: Coordinates::new(lat, lon),
            display_name: format!("{}, {}", lat, lon),
        }
    }

    fn resolver(
        provider: Arc<ScriptedProvider>,
        dir: &tempfile::TempDir,
    ) -> Resolver<Arc<ScriptedProvider>> {
        let reference = Arc::new(ReferenceData::embedded().unwrap());
        let cache = Arc::new(GeocodeCache::load(dir.path().join("cache.json")).unwrap());
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(1000)));
        Resolver::new(
            reference,
            cache,
            limiter,
            Some(provider),
            SearchSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_dictionary_never_calls_provider() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::default());
        let resolver = resolver(Arc::clone(&provider), &dir);

        let query = LocationQuery::new("R1", "Warszawa", "mazowieckie");
        let resolved = resolver.resolve(&query).await;

        assert_eq!(resolved.tier, Tier::ExactDictionary);
        assert_eq!(resolved.province, AdminLabel::known("mazowieckie"));
        assert_eq!(resolved.county, AdminLabel::known("warszawski"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_dictionary_match() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::default());
        let resolver = resolver(Arc::clone(&provider), &dir);

        let resolved = resolver
            .resolve(&LocationQuery::new("R2", "Warszawa-Wesoła", "mazowieckie"))
            .await;
        assert_eq!(resolved.tier, Tier::PartialDictionary);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_result_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with(vec![Ok(vec![candidate(
            50.9413, 16.4951,
        )])]));
        let resolver = resolver(Arc::clone(&provider), &dir);

        let query = LocationQuery::new("X1", "Żarów", "dolnośląskie")
            .with_address("ul. Armii Krajowej 50", "58-130");
        let first = resolver.resolve(&query).await;
        let second = resolver.resolve(&query).await;

        assert_eq!(first.tier, Tier::ExternalProvider);
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(
            provider.queries.lock().unwrap()[0].text,
            "Żarów, dolnośląskie, Polska"
        );
        assert!(resolver
            .cache()
            .get("X1_Żarów_dolnośląskie_ul. Armii Krajowej 50_58-130")
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_province_candidate_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with(vec![Ok(vec![
            candidate(52.40, 16.90),
            candidate(50.95, 16.50),
        ])]));
        let resolver = resolver(Arc::clone(&provider), &dir);

        let resolved = resolver
            .resolve(&LocationQuery::new("X2", "Nowa Wieś Mała", "dolnośląskie"))
            .await;
        assert_eq!(resolved.tier, Tier::ExternalProvider);
        assert!((resolved.coordinates.lat - 50.95).abs() < 0.002);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with(vec![
            Err(ProviderError::Timeout),
            Ok(vec![candidate(50.95, 16.50)]),
        ]));
        let resolver = resolver(Arc::clone(&provider), &dir);

        let resolved = resolver
            .resolve(&LocationQuery::new("X3", "Nowa Wieś Mała", "dolnośląskie"))
            .await;
        assert_eq!(resolved.tier, Tier::ExternalProvider);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_falls_back_to_centroid() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with(vec![
            Err(ProviderError::Status(503)),
            Err(ProviderError::Status(503)),
        ]));
        let resolver = resolver(Arc::clone(&provider), &dir);

        let resolved = resolver
            .resolve(&LocationQuery::new("X4", "Nowa Wieś Mała", "Województwo Dolnośląskie"))
            .await;
        assert_eq!(resolved.tier, Tier::ProvinceCentroid);
        assert_eq!(resolved.province, AdminLabel::known("dolnośląskie"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_everything_is_country_centre() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::default());
        let resolver = resolver(Arc::clone(&provider), &dir);

        let resolved = resolver.resolve(&LocationQuery::new("X5", "", "")).await;
        assert_eq!(resolved.tier, Tier::GlobalDefault);
        assert_eq!(resolved.province, AdminLabel::Unknown);
        assert_eq!(resolved.county, AdminLabel::Unknown);
        assert!((resolved.coordinates.lat - COUNTRY_CENTER.lat).abs() < 0.0011);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_county_labels() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::default());
        let resolver = resolver(Arc::clone(&provider), &dir);

        let known = resolver
            .resolve(&LocationQuery::new("C1", "Warszawa", "mazowieckie").with_county("Powiat Kozienicki"))
            .await;
        assert_eq!(known.county, AdminLabel::known("kozienicki"));
        assert!(!known.county_inferred);

        let inferred = resolver
            .resolve(&LocationQuery::new("C2", "Warszawa", "dolnośląskie").with_county("Wrocław"))
            .await;
        assert_eq!(inferred.county, AdminLabel::known("wrocławski"));
        assert!(inferred.county_inferred);

        let raw = resolver
            .resolve(&LocationQuery::new("C3", "Warszawa", "mazowieckie").with_county("Xyzzy"))
            .await;
        assert_eq!(raw.county, AdminLabel::known("xyzzy"));
        assert!(!raw.county_inferred);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_within_uses_bounded_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with(vec![
            Ok(vec![]),
            Ok(vec![candidate(50.94, 16.49)]),
        ]));
        let resolver = resolver(Arc::clone(&provider), &dir);
        let region = resolver.reference().region("dolnośląskie").unwrap().clone();

        let query = LocationQuery::new("X6", "Żarów", "dolnośląskie");
        let resolved = resolver
            .resolve_within(&query, &query.cache_key(), &region)
            .await
            .unwrap();

        assert_eq!(resolved.tier, Tier::ExternalProvider);
        assert!(region.contains(resolved.coordinates));
        assert_eq!(
            resolver.cache().get(&query.cache_key()).unwrap().coordinates,
            resolved.coordinates
        );

        let queries = provider.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].text, "Żarów, dolnośląskie, Polska");
        assert_eq!(queries[1].text, "Żarów, Polska");
        assert!(queries.iter().all(|q| q.bounded && q.viewbox == Some(region.bbox)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_within_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with(vec![
            Ok(vec![candidate(52.2, 21.0)]),
            Ok(vec![]),
            Ok(vec![]),
        ]));
        let resolver = resolver(Arc::clone(&provider), &dir);
        let region = resolver.reference().region("dolnośląskie").unwrap().clone();

        let query = LocationQuery::new("X7", "Żarów", "dolnośląskie");
        assert!(resolver
            .resolve_within(&query, &query.cache_key(), &region)
            .await
            .is_none());
        assert_eq!(provider.calls(), 3);
        assert!(resolver.cache().get(&query.cache_key()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_within_overwrites_the_given_key() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with(vec![
            Ok(vec![candidate(52.2297, 21.0122)]),
            Ok(vec![candidate(50.94, 16.49)]),
        ]));
        let resolver = resolver(Arc::clone(&provider), &dir);

        let raw = LocationQuery::new("X9", "Żarów", "Województwo Dolnośląskie");
        let wrong = resolver.resolve(&raw).await;
        resolver.cache().put(
            raw.cache_key(),
            resolver
                .cache()
                .get(&raw.cache_key())
                .unwrap()
                .with_municipality(AdminLabel::known("Warszawa")),
        );

        // Labels have been canonicalized since the first pass
        let relabelled = LocationQuery::new("X9", "Żarów", "dolnośląskie");
        let region = resolver.reference().region("dolnośląskie").unwrap().clone();
        let fixed = resolver
            .resolve_within(&relabelled, &raw.cache_key(), &region)
            .await
            .unwrap();
        assert_ne!(fixed.coordinates, wrong.coordinates);

        let again = resolver.resolve(&raw).await;
        assert_eq!(again.coordinates, fixed.coordinates);
        assert_eq!(again.municipality, AdminLabel::Unknown);
        assert_eq!(resolver.cache().len(), 1);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_municipality_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::default());
        let resolver = resolver(Arc::clone(&provider), &dir);

        let query = LocationQuery::new("M1", "Kraków", "małopolskie");
        let first = resolver.resolve(&query).await;
        assert_eq!(first.municipality, AdminLabel::Unknown);

        let entry = resolver.cache().get(&query.cache_key()).unwrap();
        resolver
            .cache()
            .put(query.cache_key(), entry.with_municipality(AdminLabel::known("Kraków")));

        let second = resolver.resolve(&query).await;
        assert_eq!(second.municipality, AdminLabel::known("Kraków"));
        assert_eq!(second.coordinates, first.coordinates);
    }

    #[tokio::test(start_paused = true)]
    async fn test_municipality_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::with_reverse(vec![
            Err(ProviderError::Status(503)),
            Ok(Some("gmina Żarów".to_string())),
            Ok(None),
            Err(ProviderError::Status(404)),
        ]));
        let resolver = resolver(Arc::clone(&provider), &dir);
        let point = Coordinates::new(50.9413, 16.4951);

        assert_eq!(resolver.municipality_at(point).await, AdminLabel::known("Żarów"));
        assert_eq!(provider.calls(), 2);
        assert_eq!(resolver.municipality_at(point).await, AdminLabel::Unknown);
        assert_eq!(resolver.municipality_at(point).await, AdminLabel::Unknown);
        assert_eq!(provider.calls(), 4);
    }
}
