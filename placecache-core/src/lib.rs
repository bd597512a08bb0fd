//! placecache Core - Data Types and Geometry
//!
//! Shared vocabulary for the discovery cache: coordinates and great-circle
//! distance, the tile grid used as the provider cache key, venue records with
//! their merge rules, tile freshness, configuration and the error taxonomy.
//! No I/O happens in this crate.

use chrono::{DateTime, Utc};

pub mod clock;
pub mod config;
pub mod error;
pub mod freshness;
pub mod geo;
pub mod tile;
pub mod venue;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{parse_flag, DiscoveryConfig, PROVIDER_MAX_RADIUS_METERS};
pub use error::{
    ConfigError, DiscoveryError, DiscoveryResult, ProviderError, StorageError, ValidationError,
};
pub use freshness::{classify, CacheRecord, LedgerKey, TileFreshness};
pub use geo::{haversine_meters, Coordinate, EARTH_RADIUS_METERS};
pub use tile::{TileBounds, TileId, TileIndex, DEFAULT_TILE_SIZE_DEG};
pub use venue::{LocalAttributes, MergeOutcome, Origin, ProviderAttributes, VenueId, VenueRecord};
