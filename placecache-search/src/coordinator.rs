//! Search orchestration.
//!
//! A search covers its disc with tiles, asks the ledger which tiles need a
//! provider call, fetches those (deduplicated across concurrent searches),
//! then answers from the venue store. Provider failures degrade a tile to
//! whatever the store already holds; store and ledger failures fail the
//! search.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::{stream, StreamExt, TryStreamExt};
use placecache_core::{
    Clock, Coordinate, DiscoveryConfig, DiscoveryResult, LedgerKey, ProviderError, TileId,
    TileIndex, ValidationError, VenueRecord,
};
use placecache_provider::PlaceProvider;
use placecache_storage::{EntityStore, FetchClaim, TileCacheLedger, TileLedgerBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::gate::LocalOnlyGate;
use crate::ranking::{compare_hits, MatchRank, TextQuery};

// ============================================================================
// REQUEST / RESULT TYPES
// ============================================================================

/// One search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub center: Coordinate,
    pub radius_meters: f64,
    /// Free-text filter over name and address.
    pub text: Option<String>,
    /// Maximum number of hits returned.
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(center: Coordinate, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
            text: None,
            limit: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A venue in a search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub venue: VenueRecord,
    pub distance_meters: f64,
    pub match_rank: MatchRank,
}

/// Ordered hits plus how they were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    /// No provider was consulted for this search.
    pub served_locally: bool,
    pub provider_called: bool,
    pub provider_calls: usize,
    /// Tiles that needed a provider call but fell back to stored data.
    pub degraded_tiles: usize,
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// What happened to one tile that needed refreshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileOutcome {
    Fetched,
    /// Provider call failed transiently.
    Failed,
    /// Became fresh while waiting for the claim.
    AlreadyFresh,
    /// Another search fetched (or tried to).
    Joined { degraded: bool },
}

#[derive(Debug, Default)]
struct RefreshStats {
    provider_calls: usize,
    degraded_tiles: usize,
}

/// Orchestrates searches over the tile ledger, venue store and provider.
pub struct SearchCoordinator {
    pub(crate) store: Arc<dyn EntityStore>,
    pub(crate) ledger: TileCacheLedger,
    pub(crate) provider: Option<Arc<dyn PlaceProvider>>,
    pub(crate) index: TileIndex,
    pub(crate) gate: LocalOnlyGate,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: DiscoveryConfig,
}

impl SearchCoordinator {
    /// Build a coordinator. The ledger uses `config.tile_ttl`.
    ///
    /// Without a provider every search is served locally, as if the
    /// local-only gate were enabled.
    pub fn new(
        config: DiscoveryConfig,
        store: Arc<dyn EntityStore>,
        ledger_backend: Arc<dyn TileLedgerBackend>,
        provider: Option<Arc<dyn PlaceProvider>>,
        clock: Arc<dyn Clock>,
    ) -> DiscoveryResult<Self> {
        config.validate()?;
        let index = config.tile_index()?;
        let gate = LocalOnlyGate::from_config(&config);

        if provider.is_none() && !gate.enabled() {
            warn!("no place provider configured; searches will use stored venues only");
        }

        Ok(Self {
            store,
            ledger: TileCacheLedger::new(ledger_backend, config.tile_ttl),
            provider,
            index,
            gate,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn tile_index(&self) -> &TileIndex {
        &self.index
    }

    pub fn ledger(&self) -> &TileCacheLedger {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn gate(&self) -> LocalOnlyGate {
        self.gate
    }

    /// Radius the provider must be queried with at the tile center so the
    /// answer covers the part of the search disc inside `tile`.
    pub fn required_radius(&self, tile: &TileId, center: &Coordinate, radius_m: f64) -> f64 {
        let reach = self.index.center(tile).distance_to(center) + radius_m;
        reach
            .min(self.index.circumradius_meters(tile))
            .max(self.config.min_query_radius_meters)
    }

    /// Run one search.
    pub async fn search(&self, request: SearchRequest) -> DiscoveryResult<SearchResult> {
        let request_id = Uuid::now_v7();
        let span = tracing::info_span!(
            "search",
            %request_id,
            center = %request.center,
            radius_m = request.radius_meters,
        );
        self.run_search(request).instrument(span).await
    }

    fn validate(&self, request: &SearchRequest) -> Result<(), ValidationError> {
        request.center.validate()?;

        let radius = request.radius_meters;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ValidationError::invalid(
                "radius_meters",
                format!("{} is not a positive distance", radius),
            ));
        }
        if radius > self.config.max_search_radius_meters {
            return Err(ValidationError::invalid(
                "radius_meters",
                format!(
                    "{} exceeds the maximum of {}",
                    radius, self.config.max_search_radius_meters
                ),
            ));
        }
        if request.limit == Some(0) {
            return Err(ValidationError::invalid("limit", "must be at least 1"));
        }
        Ok(())
    }

    async fn run_search(&self, request: SearchRequest) -> DiscoveryResult<SearchResult> {
        self.validate(&request)?;
        let query = TextQuery::new(request.text.as_deref());

        let provider = match &self.provider {
            Some(provider) if !self.gate.enabled() => Some(provider.as_ref()),
            _ => None,
        };

        let stats = match provider {
            Some(provider) => self.refresh_tiles(provider, &request).await?,
            None => RefreshStats::default(),
        };

        let candidates = self
            .store
            .query_near(&request.center, request.radius_meters)
            .await?;
        let hits = rank_candidates(candidates, &request, &query);

        info!(
            hits = hits.len(),
            provider_calls = stats.provider_calls,
            degraded_tiles = stats.degraded_tiles,
            served_locally = provider.is_none(),
            "search complete"
        );

        Ok(SearchResult {
            hits,
            served_locally: provider.is_none(),
            provider_called: stats.provider_calls > 0,
            provider_calls: stats.provider_calls,
            degraded_tiles: stats.degraded_tiles,
        })
    }

    async fn refresh_tiles(
        &self,
        provider: &dyn PlaceProvider,
        request: &SearchRequest,
    ) -> DiscoveryResult<RefreshStats> {
        let now = self.clock.now();
        let tiles = self
            .index
            .tiles_covering(&request.center, request.radius_meters);

        let keyword = if self.config.forward_text_filter {
            request
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
        } else {
            None
        };

        // A keyword fetch only answers for that keyword, so it is tracked under
        // its own ledger key.
        let mut needed = Vec::new();
        for tile in &tiles {
            let key = LedgerKey::scoped(*tile, keyword);
            let required = self.required_radius(tile, &request.center, request.radius_meters);
            let freshness = self.ledger.classify(&key, required, now).await?;
            debug!(key = %key, ?freshness, required_radius = required, "tile classified");
            if freshness.needs_fetch() {
                needed.push((key, required));
            }
        }

        debug!(tiles = tiles.len(), to_fetch = needed.len(), "cover classified");

        let outcomes: Vec<TileOutcome> = stream::iter(
            needed
                .into_iter()
                .map(|(key, required)| self.refresh_tile(provider, key, required, keyword)),
        )
        .buffer_unordered(self.config.max_concurrent_fetches)
        .try_collect()
        .await?;

        let mut stats = RefreshStats::default();
        for outcome in outcomes {
            match outcome {
                TileOutcome::Fetched => stats.provider_calls += 1,
                TileOutcome::Failed => {
                    stats.provider_calls += 1;
                    stats.degraded_tiles += 1;
                }
                TileOutcome::Joined { degraded: true } => stats.degraded_tiles += 1,
                TileOutcome::Joined { degraded: false } | TileOutcome::AlreadyFresh => {}
            }
        }
        Ok(stats)
    }

    async fn refresh_tile(
        &self,
        provider: &dyn PlaceProvider,
        key: LedgerKey,
        required: f64,
        keyword: Option<&str>,
    ) -> DiscoveryResult<TileOutcome> {
        let guard = match self.ledger.begin_fetch(key.clone()) {
            FetchClaim::Leader(guard) => guard,
            FetchClaim::Follower(waiter) => {
                waiter.wait().await;
                let freshness = self.ledger.classify(&key, required, self.clock.now()).await?;
                let degraded = freshness.needs_fetch();
                if degraded {
                    debug!(
                        key = %key,
                        "concurrent fetch left tile unrefreshed; serving stored venues"
                    );
                }
                return Ok(TileOutcome::Joined { degraded });
            }
        };

        let now = self.clock.now();
        if !self.ledger.classify(&key, required, now).await?.needs_fetch() {
            return Ok(TileOutcome::AlreadyFresh);
        }

        let query_center = self.index.center(&key.tile);
        let timeout = self.config.provider_timeout;
        let call = provider.fetch(&query_center, required, keyword);
        let fetched = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timed_out(provider.name(), timeout)),
        };

        match fetched {
            Ok(venues) => {
                let returned = venues.len();
                let summary = self.store.upsert_many(venues).await?;
                self.ledger.record(key.clone(), required, now).await?;
                drop(guard);
                info!(
                    key = %key,
                    provider = provider.name(),
                    radius_m = required,
                    returned,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    "provider fetch"
                );
                Ok(TileOutcome::Fetched)
            }
            Err(err) if err.is_transient() => {
                warn!(key = %key, error = %err, "provider fetch failed; serving stored venues");
                Ok(TileOutcome::Failed)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for SearchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCoordinator")
            .field("config", &self.config)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("ledger", &self.ledger)
            .finish()
    }
}

/// Dedupe, distance-filter, text-filter, order and truncate.
fn rank_candidates(
    candidates: Vec<VenueRecord>,
    request: &SearchRequest,
    query: &TextQuery,
) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .filter(|venue| seen.insert(venue.venue_id.clone()))
        .filter_map(|venue| {
            let distance_meters = request.center.distance_to(&venue.location);
            if distance_meters > request.radius_meters {
                return None;
            }
            let match_rank = query.rank(&venue)?;
            Some(SearchHit {
                venue,
                distance_meters,
                match_rank,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        compare_hits(
            a.match_rank,
            a.distance_meters,
            &a.venue,
            b.match_rank,
            b.distance_meters,
            &b.venue,
        )
    });

    if let Some(limit) = request.limit {
        hits.truncate(limit);
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use placecache_core::{ManualClock, ProviderAttributes};
    use placecache_provider::MockPlaceProvider;
    use placecache_storage::{InMemoryEntityStore, InMemoryTileLedger};

    fn coordinator(
        config: DiscoveryConfig,
        provider: Option<Arc<dyn PlaceProvider>>,
    ) -> SearchCoordinator {
        SearchCoordinator::new(
            config,
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryTileLedger::new()),
            provider,
            Arc::new(ManualClock::default()),
        )
        .unwrap()
    }

    fn venue(id: &str, name: &str, lat: f64, lng: f64) -> VenueRecord {
        VenueRecord::from_provider(
            id,
            name,
            Coordinate::new(lat, lng),
            ProviderAttributes::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let c = coordinator(DiscoveryConfig::default(), Some(Arc::new(MockPlaceProvider::empty())));
        let center = Coordinate::new(40.0, -73.0);
        for request in [
            SearchRequest::new(center, 0.0),
            SearchRequest::new(center, -5.0),
            SearchRequest::new(center, f64::NAN),
            SearchRequest::new(center, 60_000.0),
            SearchRequest::new(Coordinate::new(95.0, 0.0), 100.0),
            SearchRequest::new(center, 100.0).with_limit(0),
        ] {
            let err = c.search(request).await.unwrap_err();
            assert!(matches!(err, placecache_core::DiscoveryError::Validation(_)), "{err:?}");
        }
    }

    #[test]
    fn test_required_radius_bounds() {
        let c = coordinator(DiscoveryConfig::default(), None);
        let tile = c.tile_index().tile_of(&Coordinate::new(40.012, -72.987));
        let tile_center = c.tile_index().center(&tile);
        let circ = c.tile_index().circumradius_meters(&tile);

        assert_eq!(c.required_radius(&tile, &tile_center, 10.0), 1_000.0);
        assert_eq!(c.required_radius(&tile, &tile_center, 20_000.0), circ);
        let mid = c.required_radius(&tile, &tile_center, 2_000.0);
        assert!((mid - 2_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_candidates_dedupes_filters_and_orders() {
        let center = Coordinate::new(40.0, -73.0);
        let candidates = vec![
            venue("b", "Iron Works", 40.01, -73.0),
            venue("a", "Iron", 40.02, -73.0),
            venue("a", "Iron", 40.02, -73.0),
            venue("c", "Cardio Club", 40.001, -73.0),
            venue("far", "Iron Far", 41.0, -73.0),
        ];
        let request = SearchRequest::new(center, 5_000.0).with_text("iron");
        let query = TextQuery::new(request.text.as_deref());
        let hits = rank_candidates(candidates.clone(), &request, &query);
        let ids: Vec<&str> = hits.iter().map(|h| h.venue.venue_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let request = SearchRequest::new(center, 5_000.0).with_limit(2);
        let hits = rank_candidates(candidates, &request, &TextQuery::new(None));
        let ids: Vec<&str> = hits.iter().map(|h| h.venue.venue_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_without_provider_serves_locally() {
        let c = coordinator(DiscoveryConfig::default(), None);
        let result = c
            .search(SearchRequest::new(Coordinate::new(1.0, 1.0), 1_000.0))
            .await
            .unwrap();
        assert!(result.served_locally);
        assert!(!result.provider_called);
    }

    #[test]
    fn test_result_serializes_flat_hits() {
        let hit = SearchHit {
            venue: venue("a", "Alpha", 1.0, 1.0),
            distance_meters: 12.5,
            match_rank: MatchRank::NamePrefix,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["venue_id"], "a");
        assert_eq!(json["origin"], "provider");
        assert_eq!(json["match_rank"], "name_prefix");
        assert_eq!(json["distance_meters"], 12.5);
    }
}
