//! Administrative operations.
//!
//! Clearing venues and clearing the tile cache are independent: emptying one
//! never touches the other. Clearing the tile cache alone makes every tile
//! uncovered, so the next searches re-query the provider and merge into the
//! surviving venues.

use placecache_core::{DiscoveryResult, Origin, ValidationError, VenueRecord};
use placecache_storage::UpsertOutcome;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::SearchCoordinator;

/// Snapshot of cache state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub venue_count: u64,
    /// Ledger records, keyword-scoped ones included.
    pub cached_tile_count: u64,
    pub local_only: bool,
    pub provider_configured: bool,
    pub provider: Option<String>,
    pub tile_size_deg: f64,
    pub tile_ttl_secs: u64,
}

impl SearchCoordinator {
    /// Remove every stored venue. Returns the number removed.
    pub async fn clear_venues(&self) -> DiscoveryResult<u64> {
        let removed = self.store.clear().await?;
        info!(removed, "venues cleared");
        Ok(removed)
    }

    /// Remove every tile ledger record. Returns the number removed.
    pub async fn clear_tile_cache(&self) -> DiscoveryResult<u64> {
        let removed = self.ledger.clear().await?;
        info!(removed, "tile cache cleared");
        Ok(removed)
    }

    pub async fn status(&self) -> DiscoveryResult<StatusReport> {
        Ok(StatusReport {
            venue_count: self.store.count().await?,
            cached_tile_count: self.ledger.count().await?,
            local_only: self.gate.enabled(),
            provider_configured: self.provider.is_some(),
            provider: self.provider.as_ref().map(|p| p.name().to_string()),
            tile_size_deg: self.index.size_deg(),
            tile_ttl_secs: self.config.tile_ttl.as_secs(),
        })
    }

    /// Store a locally contributed venue (or local attributes for a known one).
    pub async fn contribute(&self, venue: VenueRecord) -> DiscoveryResult<UpsertOutcome> {
        if venue.origin != Origin::Local {
            return Err(ValidationError::invalid("origin", "contributions must be local").into());
        }
        if !venue.location.is_valid() {
            return Err(ValidationError::invalid(
                "location",
                format!("{} is not a valid coordinate", venue.location),
            )
            .into());
        }
        if venue.venue_id.as_str().trim().is_empty() {
            return Err(ValidationError::invalid("venue_id", "must not be empty").into());
        }
        self.store.upsert(venue).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use placecache_core::{
        Coordinate, DiscoveryConfig, LocalAttributes, ManualClock, ProviderAttributes,
    };
    use placecache_provider::MockPlaceProvider;
    use placecache_storage::{InMemoryEntityStore, InMemoryTileLedger};
    use std::sync::Arc;

    fn coordinator() -> SearchCoordinator {
        SearchCoordinator::new(
            DiscoveryConfig::default(),
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryTileLedger::new()),
            Some(Arc::new(MockPlaceProvider::empty())),
            Arc::new(ManualClock::default()),
        )
        .unwrap()
    }

    fn local(id: &str) -> VenueRecord {
        VenueRecord::local(
            id,
            "Community Gym",
            Coordinate::new(40.0, -73.0),
            LocalAttributes::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let c = coordinator();
        c.contribute(local("x")).await.unwrap();
        let status = c.status().await.unwrap();
        assert_eq!(status.venue_count, 1);
        assert_eq!(status.cached_tile_count, 0);
        assert!(!status.local_only);
        assert!(status.provider_configured);
        assert_eq!(status.provider.as_deref(), Some("mock"));
        assert_eq!(status.tile_ttl_secs, 86_400);
    }

    #[tokio::test]
    async fn test_contribute_rejects_provider_records() {
        let c = coordinator();
        let provider_record = VenueRecord::from_provider(
            "p",
            "n",
            Coordinate::new(0.0, 0.0),
            ProviderAttributes::default(),
            Utc::now(),
        );
        assert!(c.contribute(provider_record).await.is_err());
        assert!(c.contribute(local("")).await.is_err());
    }

    #[tokio::test]
    async fn test_clears_are_independent() {
        let c = coordinator();
        c.contribute(local("x")).await.unwrap();
        let tile = c.tile_index().tile_of(&Coordinate::new(40.0, -73.0));
        c.ledger().record(tile.into(), 2_000.0, Utc::now()).await.unwrap();

        assert_eq!(c.clear_tile_cache().await.unwrap(), 1);
        assert_eq!(c.status().await.unwrap().venue_count, 1);

        c.ledger().record(tile.into(), 2_000.0, Utc::now()).await.unwrap();
        assert_eq!(c.clear_venues().await.unwrap(), 1);
        assert_eq!(c.status().await.unwrap().cached_tile_count, 1);
    }
}
