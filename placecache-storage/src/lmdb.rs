//! LMDB-backed venue store and tile ledger.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each store owns its own
//! environment directory, so clearing venues never touches the ledger and
//! the other way around.
//!
//! # Key Layout
//!
//! - Venues: the UTF-8 bytes of the venue id, value is JSON [`VenueRecord`].
//! - Tiles: [`LedgerKey::encode`], the 12-byte tile key followed
//!   by the keyword bytes for keyword-scoped records. Value is JSON
//!   [`CacheRecord`].
//!
//! LMDB allows one write transaction at a time, so same-id upserts are
//! serialized by the environment.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use placecache_core::{
    CacheRecord, Coordinate, DiscoveryError, DiscoveryResult, LedgerKey, StorageError, VenueId,
    VenueRecord,
};

use crate::entity_store::{within_disc, EntityStore, UpsertOutcome};
use crate::ledger::TileLedgerBackend;

/// Default map size for a store environment.
pub const DEFAULT_MAP_SIZE_MB: usize = 256;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization error for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Serialization { key, reason }
            | LmdbStoreError::Deserialization { key, reason } => {
                StorageError::Serialization { key, reason }
            }
            other => StorageError::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

impl From<LmdbStoreError> for DiscoveryError {
    fn from(e: LmdbStoreError) -> Self {
        DiscoveryError::Storage(e.into())
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// Open (creating if needed) an environment with a single unnamed database.
fn open_env(
    path: &Path,
    max_size_mb: usize,
) -> Result<(Env, Database<Bytes, Bytes>), LmdbStoreError> {
    std::fs::create_dir_all(path)?;

    // SAFETY: each store opens its own directory once per process.
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(max_size_mb * 1024 * 1024)
            .max_dbs(1)
            .open(path)
    }
    .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

    let mut wtxn = env.write_txn().map_err(txn_err)?;
    let db: Database<Bytes, Bytes> = env
        .create_database(&mut wtxn, None)
        .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
    wtxn.commit().map_err(txn_err)?;

    Ok((env, db))
}

fn decode_venue(key: &[u8], bytes: &[u8]) -> Result<VenueRecord, LmdbStoreError> {
    serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Deserialization {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

// ============================================================================
// VENUE STORE
// ============================================================================

/// LMDB-backed [`EntityStore`].
pub struct LmdbEntityStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbEntityStore {
    /// Open the store under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let (env, db) = open_env(path.as_ref(), max_size_mb)?;
        Ok(Self { env, db })
    }

    fn scan<F>(&self, mut keep: F) -> Result<Vec<VenueRecord>, LmdbStoreError>
    where
        F: FnMut(&VenueRecord) -> bool,
    {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut out = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(txn_err)? {
            let (key, bytes) = entry.map_err(txn_err)?;
            let venue = decode_venue(key, bytes)?;
            if keep(&venue) {
                out.push(venue);
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for LmdbEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbEntityStore")
            .field("path", &self.env.path())
            .finish()
    }
}

#[async_trait]
impl EntityStore for LmdbEntityStore {
    async fn upsert(&self, venue: VenueRecord) -> DiscoveryResult<UpsertOutcome> {
        let key = venue.venue_id.as_str().as_bytes().to_vec();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let existing = match self.db.get(&wtxn, &key).map_err(txn_err)? {
            Some(bytes) => Some(decode_venue(&key, bytes)?),
            None => None,
        };

        let (outcome, stored) = match existing {
            Some(mut current) => {
                let outcome = UpsertOutcome::from(current.absorb(venue));
                (outcome, current)
            }
            None => (UpsertOutcome::Inserted, venue),
        };

        if outcome != UpsertOutcome::Ignored {
            let bytes = serde_json::to_vec(&stored).map_err(|e| LmdbStoreError::Serialization {
                key: stored.venue_id.to_string(),
                reason: e.to_string(),
            })?;
            self.db.put(&mut wtxn, &key, &bytes).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(outcome)
    }

    async fn query_near(
        &self,
        center: &Coordinate,
        radius_m: f64,
    ) -> DiscoveryResult<Vec<VenueRecord>> {
        Ok(self.scan(|v| within_disc(center, radius_m, v))?)
    }

    async fn by_ids(&self, ids: &[VenueId]) -> DiscoveryResult<Vec<VenueRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let key = id.as_str().as_bytes();
            if let Some(bytes) = self.db.get(&rtxn, key).map_err(txn_err)? {
                out.push(decode_venue(key, bytes)?);
            }
        }
        Ok(out)
    }

    async fn get(&self, id: &VenueId) -> DiscoveryResult<Option<VenueRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let key = id.as_str().as_bytes();
        match self.db.get(&rtxn, key).map_err(txn_err)? {
            Some(bytes) => Ok(Some(decode_venue(key, bytes)?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> DiscoveryResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }

    async fn clear(&self) -> DiscoveryResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let removed = self.db.len(&wtxn).map_err(txn_err)?;
        self.db.clear(&mut wtxn).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }
}

// ============================================================================
// TILE LEDGER
// ============================================================================

/// LMDB-backed [`TileLedgerBackend`].
pub struct LmdbTileLedger {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbTileLedger {
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let (env, db) = open_env(path.as_ref(), max_size_mb)?;
        Ok(Self { env, db })
    }
}

impl std::fmt::Debug for LmdbTileLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbTileLedger")
            .field("path", &self.env.path())
            .finish()
    }
}

#[async_trait]
impl TileLedgerBackend for LmdbTileLedger {
    async fn get(&self, key: &LedgerKey) -> DiscoveryResult<Option<CacheRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, &key.encode()).map_err(txn_err)? {
            Some(bytes) => {
                let record =
                    serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Deserialization {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, record: CacheRecord) -> DiscoveryResult<()> {
        let key = record.key();
        let bytes = serde_json::to_vec(&record).map_err(|e| LmdbStoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, &key.encode(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn clear(&self) -> DiscoveryResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let removed = self.db.len(&wtxn).map_err(txn_err)?;
        self.db.clear(&mut wtxn).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    async fn count(&self) -> DiscoveryResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TileCacheLedger;
    use chrono::{Duration, TimeZone, Utc};
    use placecache_core::{LocalAttributes, ProviderAttributes, TileIndex, Timestamp};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn create_test_store() -> (LmdbEntityStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbEntityStore::open(temp_dir.path(), 10).expect("store should open");
        (store, temp_dir)
    }

    fn venue(id: &str, lat: f64, lng: f64, at: Timestamp) -> VenueRecord {
        VenueRecord::from_provider(
            id,
            format!("Gym {id}"),
            Coordinate::new(lat, lng),
            ProviderAttributes {
                rating: Some(4.1),
                types: vec!["gym".into()],
                ..Default::default()
            },
            at,
        )
        .with_address("1 Main St")
    }

    #[tokio::test]
    async fn test_upsert_roundtrip() {
        let (store, _dir) = create_test_store();
        let v = venue("abc", 40.0, -73.0, t0());
        assert_eq!(store.upsert(v.clone()).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.get(&VenueId::new("abc")).await.unwrap(), Some(v));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_merge_rules_apply() {
        let (store, _dir) = create_test_store();
        store.upsert(venue("abc", 40.0, -73.0, t0())).await.unwrap();
        assert_eq!(
            store.upsert(venue("abc", 41.0, -73.0, t0() - Duration::hours(1))).await.unwrap(),
            UpsertOutcome::Ignored
        );

        let local = VenueRecord::local(
            "abc",
            "x",
            Coordinate::new(0.0, 0.0),
            LocalAttributes {
                description: Some("clean showers".into()),
                average_rating: Some(4.0),
                review_count: 3,
            },
            t0(),
        );
        assert_eq!(store.upsert(local).await.unwrap(), UpsertOutcome::Updated);

        let stored = store.get(&VenueId::new("abc")).await.unwrap().unwrap();
        assert_eq!(stored.location, Coordinate::new(40.0, -73.0));
        assert_eq!(stored.local.review_count, 3);
    }

    #[tokio::test]
    async fn test_query_near_and_by_ids() {
        let (store, _dir) = create_test_store();
        store.upsert(venue("a", 40.0, -73.0, t0())).await.unwrap();
        store.upsert(venue("b", 40.01, -73.0, t0())).await.unwrap();
        store.upsert(venue("c", 45.0, -73.0, t0())).await.unwrap();

        let near = store.query_near(&Coordinate::new(40.0, -73.0), 2_000.0).await.unwrap();
        assert_eq!(near.len(), 2);

        let found = store
            .by_ids(&[VenueId::new("c"), VenueId::new("missing")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].venue_id, VenueId::new("c"));
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        {
            let store = LmdbEntityStore::open(dir.path(), 10).unwrap();
            store.upsert(venue("persist", 1.0, 2.0, t0())).await.unwrap();
        }
        let store = LmdbEntityStore::open(dir.path(), 10).unwrap();
        assert!(store.get(&VenueId::new("persist")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_venues() {
        let (store, _dir) = create_test_store();
        store.upsert(venue("a", 1.0, 1.0, t0())).await.unwrap();
        store.upsert(venue("b", 1.0, 1.0, t0())).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ledger_backend() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(LmdbTileLedger::open(dir.path(), 10).unwrap());
        let ledger = TileCacheLedger::new(backend.clone(), std::time::Duration::from_secs(3600));
        let tile = TileIndex::default().tile_of(&Coordinate::new(40.0, -73.0));

        let key = LedgerKey::from(tile);

        ledger.record(key.clone(), 1_500.0, t0()).await.unwrap();
        let rec = ledger
            .record(key.clone(), 900.0, t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(rec.radius_covered_meters, 1_500.0);
        assert_eq!(backend.get(&key).await.unwrap(), Some(rec));
        assert_eq!(backend.count().await.unwrap(), 1);

        let scoped = LedgerKey::scoped(tile, Some("Yoga"));
        ledger.record(scoped.clone(), 4_000.0, t0()).await.unwrap();
        let stored = backend.get(&scoped).await.unwrap().unwrap();
        assert_eq!(stored.keyword.as_deref(), Some("yoga"));
        assert_eq!(backend.get(&key).await.unwrap().unwrap().radius_covered_meters, 1_500.0);
        assert_eq!(backend.count().await.unwrap(), 2);

        assert_eq!(ledger.clear().await.unwrap(), 2);
        assert_eq!(backend.count().await.unwrap(), 0);
    }

    #[test]
    fn test_error_conversion() {
        let err: StorageError = LmdbStoreError::Deserialization {
            key: "k".into(),
            reason: "bad json".into(),
        }
        .into();
        assert!(matches!(err, StorageError::Serialization { .. }));

        let err: DiscoveryError = LmdbStoreError::Transaction("MDB_MAP_FULL".into()).into();
        assert!(err.is_retryable());
    }
}
