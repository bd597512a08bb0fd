//! Google Places Nearby Search client

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use placecache_core::{
    ConfigError, Coordinate, ProviderError, VenueRecord, PROVIDER_MAX_RADIUS_METERS,
};
use reqwest::{Client, StatusCode};

use super::types::NearbySearchResponse;
use crate::providers::{bad_request, quota_exceeded, unavailable};
use crate::PlaceProvider;

const PROVIDER: &str = "google_places";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

/// Venue category searched when none is configured.
pub const DEFAULT_VENUE_TYPE: &str = "gym";

/// Google Places connection settings.
#[derive(Clone, PartialEq)]
pub struct GooglePlacesConfig {
    pub api_key: String,
    pub base_url: String,
    /// Places `type` filter sent with every search.
    pub venue_type: String,
    /// HTTP-level deadline. The coordinator applies its own timeout on top.
    pub request_timeout: Duration,
}

impl GooglePlacesConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            venue_type: DEFAULT_VENUE_TYPE.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Create GooglePlacesConfig from environment variables.
    ///
    /// Environment variables:
    /// - `GOOGLE_PLACES_API_KEY`: API key (required)
    /// - `PLACECACHE_PROVIDER_BASE_URL`: API root (default: Google's endpoint)
    /// - `PLACECACHE_VENUE_TYPE`: Places type filter (default: gym)
    /// - `PLACECACHE_PROVIDER_TIMEOUT_MS`: HTTP deadline (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("GOOGLE_PLACES_API_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "GOOGLE_PLACES_API_KEY".to_string(),
            })?;

        let mut config = Self::new(api_key);
        if let Some(base_url) =
            lookup("PLACECACHE_PROVIDER_BASE_URL").filter(|s| !s.trim().is_empty())
        {
            config.base_url = base_url.trim().trim_end_matches('/').to_string();
        }
        if let Some(venue_type) = lookup("PLACECACHE_VENUE_TYPE").filter(|s| !s.trim().is_empty()) {
            config.venue_type = venue_type.trim().to_string();
        }
        if let Some(ms) =
            lookup("PLACECACHE_PROVIDER_TIMEOUT_MS").and_then(|s| s.trim().parse().ok())
        {
            config.request_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_venue_type(mut self, venue_type: impl Into<String>) -> Self {
        self.venue_type = venue_type.into();
        self
    }
}

impl std::fmt::Debug for GooglePlacesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GooglePlacesConfig")
            .field("base_url", &self.base_url)
            .field("venue_type", &self.venue_type)
            .field("request_timeout", &self.request_timeout)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Place provider backed by the Google Places Nearby Search endpoint.
///
/// One `fetch` is one billable request: pagination tokens are ignored and no
/// place-details calls are made.
pub struct GooglePlacesProvider {
    client: Client,
    config: GooglePlacesConfig,
}

impl GooglePlacesProvider {
    pub fn new(config: GooglePlacesConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| unavailable(PROVIDER, format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GooglePlacesConfig {
        &self.config
    }
}

impl std::fmt::Debug for GooglePlacesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GooglePlacesProvider")
            .field("config", &self.config)
            .finish()
    }
}

/// Radius parameter as the endpoint accepts it: whole meters in [1, 50000].
pub(crate) fn radius_param(radius_m: f64) -> u32 {
    radius_m.ceil().clamp(1.0, PROVIDER_MAX_RADIUS_METERS) as u32
}

/// Map an HTTP failure status to a provider error.
pub(crate) fn http_error(
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        quota_exceeded(PROVIDER, retry_after_ms)
    } else if status.is_client_error() {
        bad_request(PROVIDER, format!("HTTP {}: {}", status.as_u16(), body))
    } else {
        unavailable(PROVIDER, format!("HTTP {}: {}", status.as_u16(), body))
    }
}

/// Map the `status` field of a 200 response. `None` means success.
pub(crate) fn api_status_error(status: &str, message: Option<&str>) -> Option<ProviderError> {
    let detail = match message {
        Some(m) => format!("{}: {}", status, m),
        None => status.to_string(),
    };
    match status {
        "OK" | "ZERO_RESULTS" => None,
        "OVER_QUERY_LIMIT" => Some(quota_exceeded(PROVIDER, None)),
        "REQUEST_DENIED" | "INVALID_REQUEST" => Some(bad_request(PROVIDER, detail)),
        _ => Some(unavailable(PROVIDER, detail)),
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as u64)
}

#[async_trait]
impl PlaceProvider for GooglePlacesProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch(
        &self,
        center: &Coordinate,
        radius_m: f64,
        keyword: Option<&str>,
    ) -> Result<Vec<VenueRecord>, ProviderError> {
        let url = format!("{}/nearbysearch/json", self.config.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("location", format!("{},{}", center.lat, center.lng)),
            ("radius", radius_param(radius_m).to_string()),
            ("type", self.config.venue_type.clone()),
        ];
        if let Some(keyword) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
            query.push(("keyword", keyword.to_string()));
        }
        query.push(("key", self.config.api_key.clone()));

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| unavailable(PROVIDER, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(http_error(status, retry_after_ms, &body));
        }

        let body: NearbySearchResponse = response
            .json()
            .await
            .map_err(|e| unavailable(PROVIDER, format!("Failed to parse response: {}", e)))?;

        if let Some(err) = api_status_error(&body.status, body.error_message.as_deref()) {
            return Err(err);
        }

        let synced_at = Utc::now();
        let returned = body.results.len();
        let venues: Vec<VenueRecord> = body
            .results
            .into_iter()
            .filter_map(|place| place.into_venue(synced_at))
            .collect();

        if venues.len() < returned {
            tracing::debug!(
                dropped = returned - venues.len(),
                "provider results without id or location dropped"
            );
        }
        if body.next_page_token.is_some() {
            tracing::debug!(center = %center, radius_m, "further result pages not requested");
        }

        Ok(venues)
    }
}
