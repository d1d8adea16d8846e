//! Municipality pass: attach the gmina to cached points that have none.

use anyhow::{bail, Context, Result};
use tracing::info;

use super::resolve::progress_bar;
use super::{with_flushed_cache, Pipeline};
use crate::geocode::GeocodingProvider;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MunicipalitySummary {
    pub visited: usize,
    pub found: usize,
    pub unknown: usize,
}

impl MunicipalitySummary {
    pub fn log(&self) {
        info!(
            "Looked up {} municipalities: {} found, {} unknown",
            self.visited, self.found, self.unknown
        );
    }
}

impl<P: GeocodingProvider> Pipeline<P> {
    /// Reverse-geocode every cache entry without a municipality, one provider call each.
    ///
    /// Lookups that fail are stored as unknown and are not repeated by later runs.
    /// Resolve passes report the stored municipality on cache hits.
    pub async fn enrich_municipalities(&self) -> Result<MunicipalitySummary> {
        if !self.resolver.is_online() {
            bail!("Municipality lookup needs the external geocoder, which is disabled");
        }

        with_flushed_cache(&self.cache, || async move {
            let pending = self.cache.missing_municipality();
            info!("{} cached locations without a municipality", pending.len());

            let progress = progress_bar(pending.len() as u64, self.settings.show_progress);
            let mut summary = MunicipalitySummary::default();

            for (key, entry) in pending {
                let municipality = self.resolver.municipality_at(entry.coordinates).await;
                if municipality.is_known() {
                    summary.found += 1;
                } else {
                    summary.unknown += 1;
                }
                summary.visited += 1;

                self.cache.put(key, entry.with_municipality(municipality));
                progress.inc(1);

                if summary.visited % self.settings.flush_every.max(1) == 0 {
                    self.cache
                        .flush_if_dirty()
                        .context("Periodic cache flush failed")?;
                }
            }

            progress.finish_and_clear();
            Ok(summary)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geocode::{GeocodeCache, NominatimClient};
    use crate::models::AdminLabel;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline(config: &Config) -> Pipeline<NominatimClient> {
        Pipeline::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn test_missing_municipalities_are_looked_up_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "50.9413"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "address": { "municipality": "gmina Żarów", "town": "Żarów" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        std::fs::write(
            &cache_path,
            r#"{
                "A_Żarów_dolnośląskie__": [50.9413, 16.4951],
                "B_Kozienice_mazowieckie__": { "coordinates": [51.58, 21.55], "municipality": "Kozienice" }
            }"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.cache.path = cache_path.clone();
        config.provider.url = format!("{}/search", server.uri());
        config.provider.interval_ms = 1000;

        let summary = pipeline(&config).enrich_municipalities().await.unwrap();
        assert_eq!(
            summary,
            MunicipalitySummary {
                visited: 1,
                found: 1,
                unknown: 0
            }
        );

        let cache = GeocodeCache::load(&cache_path).unwrap();
        assert_eq!(
            cache.get("A_Żarów_dolnośląskie__").unwrap().municipality,
            Some(AdminLabel::known("Żarów"))
        );
        assert_eq!(
            cache.get("B_Kozienice_mazowieckie__").unwrap().municipality,
            Some(AdminLabel::known("Kozienice"))
        );

        // Nothing left to visit
        let again = pipeline(&config).enrich_municipalities().await.unwrap();
        assert_eq!(again.visited, 0);
    }

    #[tokio::test]
    async fn test_offline_pipeline_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.path = dir.path().join("cache.json");
        config.provider.enabled = false;

        let err = pipeline(&config).enrich_municipalities().await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
