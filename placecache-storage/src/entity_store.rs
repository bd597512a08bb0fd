//! Venue store trait and in-memory implementation.
//!
//! The store is the only place venue data persists. Every write goes through
//! [`EntityStore::upsert`], which applies the ownership-aware merge from
//! [`VenueRecord::absorb`] so a venue id never appears twice.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use placecache_core::{
    Coordinate, DiscoveryResult, MergeOutcome, StorageError, VenueId, VenueRecord,
    EARTH_RADIUS_METERS,
};

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The id was not stored before.
    Inserted,
    /// The stored record changed.
    Updated,
    /// The incoming record lost the merge.
    Ignored,
}

impl From<MergeOutcome> for UpsertOutcome {
    fn from(outcome: MergeOutcome) -> Self {
        match outcome {
            MergeOutcome::Updated => Self::Updated,
            MergeOutcome::Ignored => Self::Ignored,
        }
    }
}

/// Tally of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub ignored: usize,
}

impl UpsertSummary {
    pub fn add(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Ignored => self.ignored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.ignored
    }
}

/// Canonical, deduplicated venue collection.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert or merge a venue by id.
    async fn upsert(&self, venue: VenueRecord) -> DiscoveryResult<UpsertOutcome>;

    /// Upsert a batch in order.
    async fn upsert_many(&self, venues: Vec<VenueRecord>) -> DiscoveryResult<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for venue in venues {
            summary.add(self.upsert(venue).await?);
        }
        Ok(summary)
    }

    /// Every stored venue within `radius_m` meters of `center`.
    async fn query_near(
        &self,
        center: &Coordinate,
        radius_m: f64,
    ) -> DiscoveryResult<Vec<VenueRecord>>;

    /// Stored venues for the given ids. Unknown ids are skipped.
    async fn by_ids(&self, ids: &[VenueId]) -> DiscoveryResult<Vec<VenueRecord>>;

    async fn get(&self, id: &VenueId) -> DiscoveryResult<Option<VenueRecord>>;

    async fn count(&self) -> DiscoveryResult<u64>;

    /// Remove every venue. Returns the number removed.
    async fn clear(&self) -> DiscoveryResult<u64>;
}

/// Cheap latitude band check before the haversine distance.
pub(crate) fn within_disc(center: &Coordinate, radius_m: f64, venue: &VenueRecord) -> bool {
    let lat_band = (radius_m / EARTH_RADIUS_METERS).to_degrees();
    if (venue.location.lat - center.lat).abs() > lat_band {
        return false;
    }
    center.distance_to(&venue.location) <= radius_m
}

/// In-memory venue store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEntityStore {
    venues: Arc<RwLock<HashMap<VenueId, VenueRecord>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn upsert(&self, venue: VenueRecord) -> DiscoveryResult<UpsertOutcome> {
        let mut venues = self.venues.write().map_err(|_| StorageError::LockPoisoned)?;
        match venues.get_mut(&venue.venue_id) {
            Some(existing) => Ok(existing.absorb(venue).into()),
            None => {
                venues.insert(venue.venue_id.clone(), venue);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn query_near(
        &self,
        center: &Coordinate,
        radius_m: f64,
    ) -> DiscoveryResult<Vec<VenueRecord>> {
        let venues = self.venues.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(venues
            .values()
            .filter(|v| within_disc(center, radius_m, v))
            .cloned()
            .collect())
    }

    async fn by_ids(&self, ids: &[VenueId]) -> DiscoveryResult<Vec<VenueRecord>> {
        let venues = self.venues.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(ids.iter().filter_map(|id| venues.get(id).cloned()).collect())
    }

    async fn get(&self, id: &VenueId) -> DiscoveryResult<Option<VenueRecord>> {
        let venues = self.venues.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(venues.get(id).cloned())
    }

    async fn count(&self) -> DiscoveryResult<u64> {
        let venues = self.venues.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(venues.len() as u64)
    }

    async fn clear(&self) -> DiscoveryResult<u64> {
        let mut venues = self.venues.write().map_err(|_| StorageError::LockPoisoned)?;
        let removed = venues.len() as u64;
        venues.clear();
        Ok(removed)
    }
}
