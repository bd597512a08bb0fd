//! Per-tile provider query bookkeeping.
//!
//! [`TileCacheLedger`] answers "does this tile need a provider call for this
//! radius?" and remembers each successful query. It never stores venue data.
//! Queries filtered by a provider keyword are remembered under their own
//! [`LedgerKey`] and never count as unfiltered coverage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use placecache_core::{
    classify, CacheRecord, DiscoveryResult, LedgerKey, StorageError, TileFreshness, TileId,
    Timestamp,
};
use tokio::sync::Mutex;

use crate::single_flight::{FetchClaim, SingleFlight};

/// Persistence for ledger records. At most one record per key.
#[async_trait]
pub trait TileLedgerBackend: Send + Sync {
    async fn get(&self, key: &LedgerKey) -> DiscoveryResult<Option<CacheRecord>>;

    /// Insert or replace the record for `record.key()`.
    async fn put(&self, record: CacheRecord) -> DiscoveryResult<()>;

    /// Remove every record. Returns the number removed.
    async fn clear(&self) -> DiscoveryResult<u64>;

    async fn count(&self) -> DiscoveryResult<u64>;
}

/// In-memory ledger backend.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTileLedger {
    records: Arc<RwLock<HashMap<LedgerKey, CacheRecord>>>,
}

impl InMemoryTileLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TileLedgerBackend for InMemoryTileLedger {
    async fn get(&self, key: &LedgerKey) -> DiscoveryResult<Option<CacheRecord>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn put(&self, record: CacheRecord) -> DiscoveryResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.insert(record.key(), record);
        Ok(())
    }

    async fn clear(&self) -> DiscoveryResult<u64> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn count(&self) -> DiscoveryResult<u64> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.len() as u64)
    }
}

/// Freshness oracle over a ledger backend, with single-flight fetch claims.
pub struct TileCacheLedger {
    backend: Arc<dyn TileLedgerBackend>,
    ttl: Duration,
    flights: SingleFlight,
    /// Serializes read-modify-write in `record`.
    write_lock: Mutex<()>,
}

impl TileCacheLedger {
    pub fn new(backend: Arc<dyn TileLedgerBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            flights: SingleFlight::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Ledger over a fresh in-memory backend.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryTileLedger::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The unfiltered record for `tile`.
    pub async fn get(&self, tile: &TileId) -> DiscoveryResult<Option<CacheRecord>> {
        self.backend.get(&LedgerKey::from(*tile)).await
    }

    pub async fn get_entry(&self, key: &LedgerKey) -> DiscoveryResult<Option<CacheRecord>> {
        self.backend.get(key).await
    }

    /// Classify `key` for a query needing `required_radius` meters at `now`.
    pub async fn classify(
        &self,
        key: &LedgerKey,
        required_radius: f64,
        now: Timestamp,
    ) -> DiscoveryResult<TileFreshness> {
        let record = self.backend.get(key).await?;
        Ok(classify(record.as_ref(), required_radius, now, self.ttl))
    }

    /// Remember a successful provider query under `key` at `radius`.
    pub async fn record(
        &self,
        key: LedgerKey,
        radius: f64,
        now: Timestamp,
    ) -> DiscoveryResult<CacheRecord> {
        let _write = self.write_lock.lock().await;
        let next = match self.backend.get(&key).await? {
            Some(existing) => existing.refreshed(radius, now, self.ttl),
            None => CacheRecord::for_key(key, radius, now),
        };
        self.backend.put(next.clone()).await?;
        tracing::debug!(
            tile = %next.tile_id,
            keyword = next.keyword.as_deref(),
            radius_covered_meters = next.radius_covered_meters,
            "tile recorded"
        );
        Ok(next)
    }

    /// Claim the right to fetch `key`. See [`SingleFlight::claim`].
    pub fn begin_fetch(&self, key: LedgerKey) -> FetchClaim {
        self.flights.claim(key)
    }

    /// Remove every record, keyword-scoped ones included. Returns the number
    /// removed.
    pub async fn clear(&self) -> DiscoveryResult<u64> {
        let _write = self.write_lock.lock().await;
        self.backend.clear().await
    }

    pub async fn count(&self) -> DiscoveryResult<u64> {
        self.backend.count().await
    }
}

impl std::fmt::Debug for TileCacheLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCacheLedger")
            .field("ttl", &self.ttl)
            .field("in_flight", &self.flights.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use placecache_core::{Coordinate, TileIndex};

    const TTL: Duration = Duration::from_secs(24 * 3600);

    fn tile() -> TileId {
        TileIndex::default().tile_of(&Coordinate::new(40.0, -73.0))
    }

    fn key() -> LedgerKey {
        tile().into()
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_classify_lifecycle() {
        let ledger = TileCacheLedger::in_memory(TTL);
        let freshness = ledger.classify(&key(), 1_000.0, t0()).await.unwrap();
        assert_eq!(freshness, TileFreshness::Uncovered);

        ledger.record(key(), 2_000.0, t0()).await.unwrap();
        assert_eq!(ledger.classify(&key(), 1_500.0, t0()).await.unwrap(), TileFreshness::Fresh);
        assert_eq!(ledger.classify(&key(), 2_500.0, t0()).await.unwrap(), TileFreshness::Stale);

        let expired = t0() + chrono::Duration::hours(24) + chrono::Duration::seconds(1);
        let freshness = ledger.classify(&key(), 1_500.0, expired).await.unwrap();
        assert_eq!(freshness, TileFreshness::Stale);
    }

    #[tokio::test]
    async fn test_record_keeps_one_record_with_max_radius() {
        let ledger = TileCacheLedger::in_memory(TTL);
        ledger.record(key(), 3_000.0, t0()).await.unwrap();
        let later = t0() + chrono::Duration::minutes(5);
        let rec = ledger.record(key(), 1_000.0, later).await.unwrap();
        assert_eq!(rec.radius_covered_meters, 3_000.0);
        assert_eq!(rec.last_queried_at, later);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keyword_record_does_not_cover_tile() {
        let ledger = TileCacheLedger::in_memory(TTL);
        let scoped = LedgerKey::scoped(tile(), Some("Yoga"));
        ledger.record(scoped.clone(), 3_000.0, t0()).await.unwrap();

        let again = LedgerKey::scoped(tile(), Some(" yoga "));
        assert_eq!(ledger.classify(&again, 2_000.0, t0()).await.unwrap(), TileFreshness::Fresh);
        let other = LedgerKey::scoped(tile(), Some("boxing"));
        assert_eq!(ledger.classify(&other, 2_000.0, t0()).await.unwrap(), TileFreshness::Uncovered);
        assert_eq!(ledger.classify(&key(), 2_000.0, t0()).await.unwrap(), TileFreshness::Uncovered);
        assert!(ledger.get(&tile()).await.unwrap().is_none());
        assert_eq!(ledger.get_entry(&scoped).await.unwrap().unwrap().key(), scoped);
    }

    #[tokio::test]
    async fn test_clear() {
        let ledger = TileCacheLedger::in_memory(TTL);
        ledger.record(key(), 3_000.0, t0()).await.unwrap();
        ledger.record(LedgerKey::scoped(tile(), Some("yoga")), 3_000.0, t0()).await.unwrap();
        assert_eq!(ledger.clear().await.unwrap(), 2);
        assert!(ledger.get(&tile()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_begin_fetch_single_flight() {
        let ledger = TileCacheLedger::in_memory(TTL);
        let first = ledger.begin_fetch(key());
        assert!(matches!(first, FetchClaim::Leader(_)));
        assert!(matches!(ledger.begin_fetch(key()), FetchClaim::Follower(_)));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use placecache_core::{Coordinate, TileIndex};
    use proptest::prelude::*;

    proptest! {
        /// Within the TTL the covered radius never shrinks.
        #[test]
        fn prop_radius_monotone_within_ttl(
            radii in proptest::collection::vec(1.0f64..50_000.0, 1..20),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let ledger = TileCacheLedger::in_memory(Duration::from_secs(3600));
                let tile = TileIndex::default().tile_of(&Coordinate::new(12.0, 34.0));
                let key = LedgerKey::from(tile);
                let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
                let mut max_seen: f64 = 0.0;
                for (i, r) in radii.iter().enumerate() {
                    let now = start + chrono::Duration::seconds(i as i64);
                    let rec = ledger.record(key.clone(), *r, now).await.unwrap();
                    max_seen = max_seen.max(*r);
                    assert_eq!(rec.radius_covered_meters, max_seen);
                }
            });
        }
    }
}
