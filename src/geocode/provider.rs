//! External geocoding provider seam and the Nominatim client.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::models::{BoundingBox, Coordinates};

/// One free-text search.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuery {
    pub text: String,
    pub limit: u32,
    /// Restrict (or bias, when `bounded` is false) results to this box
    pub viewbox: Option<BoundingBox>,
    pub bounded: bool,
}

impl ProviderQuery {
    pub fn new(text: impl Into<String>, limit: u32) -> Self {
        Self {
            text: text.into(),
            limit,
            viewbox: None,
            bounded: false,
        }
    }

    pub fn bounded_to(mut self, bbox: BoundingBox) -> Self {
        self.viewbox = Some(bbox);
        self.bounded = true;
        self
    }
}

/// A place returned by the provider, in provider ranking order.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub coordinates: Coordinates,
    pub display_name: String,
}

/// A geocoder. Implementations perform exactly one request per call; rate limiting and
/// retries are the caller's concern.
pub trait GeocodingProvider: Send + Sync {
    fn search(
        &self,
        query: &ProviderQuery,
    ) -> impl Future<Output = Result<Vec<Candidate>, ProviderError>> + Send;

    /// Name of the municipality containing `coords`, as the provider spells it. `None` when
    /// the provider knows no address there.
    fn reverse(
        &self,
        coords: Coordinates,
    ) -> impl Future<Output = Result<Option<String>, ProviderError>> + Send;
}

impl<P: GeocodingProvider> GeocodingProvider for Arc<P> {
    fn search(
        &self,
        query: &ProviderQuery,
    ) -> impl Future<Output = Result<Vec<Candidate>, ProviderError>> + Send {
        (**self).search(query)
    }

    fn reverse(
        &self,
        coords: Coordinates,
    ) -> impl Future<Output = Result<Option<String>, ProviderError>> + Send {
        (**self).reverse(coords)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: Degrees,
    lon: Degrees,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    /// Missing when the point is not near any address (`{"error": "Unable to geocode"}`)
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    municipality: Option<String>,
    town: Option<String>,
    city: Option<String>,
    village: Option<String>,
}

impl NominatimAddress {
    /// Most specific administrative name available.
    fn municipality(self) -> Option<String> {
        [self.municipality, self.town, self.city, self.village]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
    }
}

/// Nominatim returns degrees as strings; some compatible servers use numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Degrees {
    Text(String),
    Number(f64),
}

impl Degrees {
    fn value(&self) -> Result<f64, ProviderError> {
        let value = match self {
            Degrees::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| ProviderError::Malformed(format!("invalid degree value {:?}", text)))?,
            Degrees::Number(n) => *n,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ProviderError::Malformed("non-finite degree value".to_string()))
        }
    }
}

/// Client for a Nominatim-compatible server. Forward searches go to the configured URL,
/// reverse lookups to the sibling `reverse` endpoint.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: Client,
    url: Url,
    reverse_url: Url,
    country_code: String,
}

impl NominatimClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()
            .map_err(ProviderError::Transport)?;
        let url = Url::parse(&config.url)
            .map_err(|e| ProviderError::Malformed(format!("invalid provider url: {}", e)))?;
        let reverse_url = url
            .join("reverse")
            .map_err(|e| ProviderError::Malformed(format!("invalid provider url: {}", e)))?;

        Ok(Self {
            client,
            url,
            reverse_url,
            country_code: config.country_code.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ProviderError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

impl GeocodingProvider for NominatimClient {
    async fn search(&self, query: &ProviderQuery) -> Result<Vec<Candidate>, ProviderError> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.text.clone()),
            ("format", "json".to_string()),
            ("limit", query.limit.to_string()),
            ("countrycodes", self.country_code.clone()),
        ];
        if let Some(bbox) = &query.viewbox {
            params.push(("viewbox", bbox.to_viewbox()));
            if query.bounded {
                params.push(("bounded", "1".to_string()));
            }
        }

        debug!("Nominatim search: {}", query.text);

        let mut url = self.url.clone();
        url.query_pairs_mut().extend_pairs(params.iter());

        let places: Vec<NominatimPlace> = self.get_json(url).await?;

        places
            .into_iter()
            .map(|place| {
                Ok(Candidate {
                    coordinates: Coordinates::new(place.lat.value()?, place.lon.value()?),
                    display_name: place.display_name,
                })
            })
            .collect()
    }

    async fn reverse(&self, coords: Coordinates) -> Result<Option<String>, ProviderError> {
        debug!("Nominatim reverse: {}", coords);

        let mut url = self.reverse_url.clone();
        url.query_pairs_mut()
            .append_pair("lat", &coords.lat.to_string())
            .append_pair("lon", &coords.lon.to_string())
            .append_pair("format", "json")
            .append_pair("addressdetails", "1");

        let place: NominatimReverse = self.get_json(url).await?;
        Ok(place.address.and_then(NominatimAddress::municipality))
    }
}
