//! Discovery configuration
//!
//! Loaded from environment variables with defaults suited to a single
//! regional deployment. Every value can also be set through `with_*` builders.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geo::Coordinate;
use crate::tile::{TileIndex, DEFAULT_TILE_SIZE_DEG};

/// Largest radius the upstream Nearby Search endpoint accepts.
pub const PROVIDER_MAX_RADIUS_METERS: f64 = 50_000.0;

/// Tunables for the discovery cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Tile edge in degrees. Changing it orphans existing ledger records.
    pub tile_size_deg: f64,

    /// How long a provider query keeps a tile fresh.
    pub tile_ttl: Duration,

    /// Floor for the radius sent to the provider per tile.
    pub min_query_radius_meters: f64,

    /// Largest accepted search radius.
    pub max_search_radius_meters: f64,

    /// Deadline for a single provider call.
    pub provider_timeout: Duration,

    /// Upper bound on provider calls in flight for one search.
    pub max_concurrent_fetches: usize,

    /// Serve every search from the local store only.
    pub local_only: bool,

    /// Forward the text filter to the provider as a keyword.
    pub forward_text_filter: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            tile_size_deg: DEFAULT_TILE_SIZE_DEG,
            tile_ttl: Duration::from_secs(24 * 60 * 60),
            min_query_radius_meters: 1_000.0,
            max_search_radius_meters: PROVIDER_MAX_RADIUS_METERS,
            provider_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 4,
            local_only: false,
            forward_text_filter: false,
        }
    }
}

impl DiscoveryConfig {
    /// Create DiscoveryConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PLACECACHE_TILE_SIZE_DEG`: Tile edge in degrees (default: 0.05)
    /// - `PLACECACHE_TILE_TTL_SECS`: Tile freshness window (default: 86400)
    /// - `PLACECACHE_MIN_QUERY_RADIUS_M`: Minimum provider radius (default: 1000)
    /// - `PLACECACHE_MAX_SEARCH_RADIUS_M`: Maximum search radius (default: 50000)
    /// - `PLACECACHE_PROVIDER_TIMEOUT_MS`: Provider call deadline (default: 10000)
    /// - `PLACECACHE_MAX_CONCURRENT_FETCHES`: Parallel provider calls (default: 4)
    /// - `PLACECACHE_LOCAL_ONLY`: "true"/"1"/"yes"/"on" to disable the provider
    /// - `PLACECACHE_FORWARD_TEXT_FILTER`: same flag syntax (default: off)
    ///
    /// Unparseable values fall back to the default; call [`validate`](Self::validate)
    /// before use.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Used by [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let tile_size_deg = lookup("PLACECACHE_TILE_SIZE_DEG")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.tile_size_deg);

        let tile_ttl = lookup("PLACECACHE_TILE_TTL_SECS")
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.tile_ttl);

        let min_query_radius_meters = lookup("PLACECACHE_MIN_QUERY_RADIUS_M")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.min_query_radius_meters);

        let max_search_radius_meters = lookup("PLACECACHE_MAX_SEARCH_RADIUS_M")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_search_radius_meters);

        let provider_timeout = lookup("PLACECACHE_PROVIDER_TIMEOUT_MS")
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.provider_timeout);

        let max_concurrent_fetches = lookup("PLACECACHE_MAX_CONCURRENT_FETCHES")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_concurrent_fetches);

        let local_only = lookup("PLACECACHE_LOCAL_ONLY")
            .map(|s| parse_flag(&s))
            .unwrap_or(defaults.local_only);

        let forward_text_filter = lookup("PLACECACHE_FORWARD_TEXT_FILTER")
            .map(|s| parse_flag(&s))
            .unwrap_or(defaults.forward_text_filter);

        Self {
            tile_size_deg,
            tile_ttl,
            min_query_radius_meters,
            max_search_radius_meters,
            provider_timeout,
            max_concurrent_fetches,
            local_only,
            forward_text_filter,
        }
    }

    pub fn with_tile_size_deg(mut self, tile_size_deg: f64) -> Self {
        self.tile_size_deg = tile_size_deg;
        self
    }

    pub fn with_tile_ttl(mut self, ttl: Duration) -> Self {
        self.tile_ttl = ttl;
        self
    }

    pub fn with_min_query_radius(mut self, meters: f64) -> Self {
        self.min_query_radius_meters = meters;
        self
    }

    pub fn with_max_search_radius(mut self, meters: f64) -> Self {
        self.max_search_radius_meters = meters;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n;
        self
    }

    pub fn with_local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }

    pub fn with_forward_text_filter(mut self, forward: bool) -> Self {
        self.forward_text_filter = forward;
        self
    }

    /// Tile index for the configured resolution.
    pub fn tile_index(&self) -> Result<TileIndex, ConfigError> {
        TileIndex::new(self.tile_size_deg)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let index = self.tile_index()?;

        // Cells touching the equator are the widest. A provider query must
        // still see a whole cell from its center.
        let widest = index.circumradius_meters(&index.tile_of(&Coordinate::new(0.0, 0.0)));
        if widest > PROVIDER_MAX_RADIUS_METERS {
            return Err(invalid(
                "tile_size_deg",
                self.tile_size_deg,
                "tile circumradius exceeds the provider's 50000 m search limit",
            ));
        }

        if self.tile_ttl.is_zero() {
            return Err(invalid("tile_ttl", format!("{:?}", self.tile_ttl), "must be positive"));
        }

        if !self.min_query_radius_meters.is_finite() || self.min_query_radius_meters <= 0.0 {
            return Err(invalid(
                "min_query_radius_meters",
                self.min_query_radius_meters,
                "must be a positive number of meters",
            ));
        }

        if !self.max_search_radius_meters.is_finite()
            || self.max_search_radius_meters <= 0.0
            || self.max_search_radius_meters > PROVIDER_MAX_RADIUS_METERS
        {
            return Err(invalid(
                "max_search_radius_meters",
                self.max_search_radius_meters,
                "must be in (0, 50000]",
            ));
        }

        if self.min_query_radius_meters > self.max_search_radius_meters {
            return Err(invalid(
                "min_query_radius_meters",
                self.min_query_radius_meters,
                "must not exceed max_search_radius_meters",
            ));
        }

        if self.provider_timeout.is_zero() {
            return Err(invalid(
                "provider_timeout",
                format!("{:?}", self.provider_timeout),
                "must be positive",
            ));
        }

        if self.max_concurrent_fetches == 0 {
            return Err(invalid("max_concurrent_fetches", 0, "must be at least 1"));
        }

        Ok(())
    }
}

/// Parse a boolean switch. Accepts true/1/yes/on in any case; anything else is off.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
