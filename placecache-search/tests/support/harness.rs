use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use placecache_core::{Coordinate, DiscoveryConfig, ManualClock, TileId};
use placecache_provider::PlaceProvider;
use placecache_search::{SearchCoordinator, SearchResult};
use placecache_storage::{
    EntityStore, InMemoryEntityStore, InMemoryTileLedger, TileLedgerBackend,
};
use placecache_test_utils::fixtures::{catalogue_around, manual_clock};
use placecache_test_utils::{MockPlaceProvider, VenueId, VenueRecord};

/// Center used by the scenario tests.
pub fn scenario_center() -> Coordinate {
    Coordinate::new(40.0, -73.0)
}

/// 400 venues spread over 25 km around [`scenario_center`].
pub fn scenario_catalogue() -> Vec<VenueRecord> {
    catalogue_around(scenario_center(), 400, 25_000.0)
}

/// A coordinator wired to a mock provider and a manual clock shared by both.
pub struct Harness {
    pub coordinator: Arc<SearchCoordinator>,
    pub provider: Arc<MockPlaceProvider>,
    pub clock: ManualClock,
    pub catalogue: Vec<VenueRecord>,
}

impl Harness {
    /// In-memory stores over [`scenario_catalogue`].
    pub fn new(config: DiscoveryConfig) -> Self {
        Self::with_parts(
            config,
            scenario_catalogue(),
            None,
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryTileLedger::new()),
        )
    }

    pub fn with_parts(
        config: DiscoveryConfig,
        catalogue: Vec<VenueRecord>,
        latency: Option<Duration>,
        store: Arc<dyn EntityStore>,
        ledger: Arc<dyn TileLedgerBackend>,
    ) -> Self {
        let clock = manual_clock();
        let mut provider =
            MockPlaceProvider::new(catalogue.clone()).with_clock(Arc::new(clock.clone()));
        if let Some(latency) = latency {
            provider = provider.with_latency(latency);
        }
        let provider = Arc::new(provider);
        let coordinator = SearchCoordinator::new(
            config,
            store,
            ledger,
            Some(provider.clone() as Arc<dyn PlaceProvider>),
            Arc::new(clock.clone()),
        )
        .expect("valid test configuration");
        Self {
            coordinator: Arc::new(coordinator),
            provider,
            clock,
            catalogue,
        }
    }

    pub fn cover(&self, center: &Coordinate, radius_m: f64) -> BTreeSet<TileId> {
        self.coordinator.tile_index().tiles_covering(center, radius_m)
    }

    /// Calls made since the last reset, then reset.
    pub fn take_calls(&self) -> usize {
        let calls = self.provider.call_count();
        self.provider.reset_calls();
        calls
    }
}

pub fn hit_ids(result: &SearchResult) -> Vec<VenueId> {
    let mut ids: Vec<VenueId> = result.hits.iter().map(|h| h.venue.venue_id.clone()).collect();
    ids.sort();
    ids
}

pub fn hit_distances(result: &SearchResult) -> Vec<f64> {
    result.hits.iter().map(|h| h.distance_meters).collect()
}
