//! Tile cache records and freshness classification.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tile::TileId;
use crate::Timestamp;

/// Freshness of one tile relative to a required provider radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileFreshness {
    /// Queried within the TTL at a radius at least as large as required.
    Fresh,
    /// Queried before, but expired or at too small a radius.
    Stale,
    /// Never queried (or cleared).
    Uncovered,
}

impl TileFreshness {
    /// Returns true when the tile needs a provider call.
    pub fn needs_fetch(&self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// Identity of a ledger record: a tile, optionally scoped to the keyword the
/// provider was queried with.
///
/// A keyword-scoped record only vouches for repeats of that keyword. It never
/// marks the tile covered for unfiltered searches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub tile: TileId,
    pub keyword: Option<String>,
}

impl LedgerKey {
    /// Key for `tile` under `keyword`. The keyword is trimmed and lowercased;
    /// a blank keyword yields the unfiltered key.
    pub fn scoped(tile: TileId, keyword: Option<&str>) -> Self {
        let keyword = keyword
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());
        Self { tile, keyword }
    }

    pub fn is_scoped(&self) -> bool {
        self.keyword.is_some()
    }

    /// Storage key: the 12-byte tile key followed by the keyword's UTF-8
    /// bytes. Unfiltered keys are exactly [`TileId::encode`].
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.tile.encode().to_vec();
        if let Some(keyword) = &self.keyword {
            bytes.extend_from_slice(keyword.as_bytes());
        }
        bytes
    }
}

impl From<TileId> for LedgerKey {
    fn from(tile: TileId) -> Self {
        Self {
            tile,
            keyword: None,
        }
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.keyword {
            Some(keyword) => write!(f, "{}[{}]", self.tile, keyword),
            None => write!(f, "{}", self.tile),
        }
    }
}

/// The ledger's memory of one provider query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub tile_id: TileId,
    /// Normalized keyword the query was filtered by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub last_queried_at: Timestamp,
    pub radius_covered_meters: f64,
}

impl CacheRecord {
    pub fn new(tile_id: TileId, radius_covered_meters: f64, last_queried_at: Timestamp) -> Self {
        Self {
            tile_id,
            keyword: None,
            last_queried_at,
            radius_covered_meters,
        }
    }

    /// First record under `key`.
    pub fn for_key(key: LedgerKey, radius_covered_meters: f64, last_queried_at: Timestamp) -> Self {
        Self {
            tile_id: key.tile,
            keyword: key.keyword,
            last_queried_at,
            radius_covered_meters,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            tile: self.tile_id,
            keyword: self.keyword.clone(),
        }
    }

    /// Age of the record at `now`. Records from the future count as age zero.
    pub fn age(&self, now: Timestamp) -> Duration {
        (now - self.last_queried_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true while the record is inside the freshness window.
    pub fn is_within_ttl(&self, now: Timestamp, ttl: Duration) -> bool {
        self.age(now) < ttl
    }

    /// Record after another provider query of this tile at `radius`.
    ///
    /// The covered radius only grows while the previous query is still fresh.
    /// An expired radius proves nothing, so it is replaced outright.
    pub fn refreshed(&self, radius: f64, now: Timestamp, ttl: Duration) -> Self {
        let radius_covered_meters = if self.is_within_ttl(now, ttl) {
            self.radius_covered_meters.max(radius)
        } else {
            radius
        };
        Self {
            tile_id: self.tile_id,
            keyword: self.keyword.clone(),
            last_queried_at: now,
            radius_covered_meters,
        }
    }
}

/// Classify a tile given its record (if any).
pub fn classify(
    record: Option<&CacheRecord>,
    required_radius: f64,
    now: Timestamp,
    ttl: Duration,
) -> TileFreshness {
    match record {
        None => TileFreshness::Uncovered,
        Some(r) if r.is_within_ttl(now, ttl) && r.radius_covered_meters >= required_radius => {
            TileFreshness::Fresh
        }
        Some(_) => TileFreshness::Stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::tile::TileIndex;
    use chrono::{TimeZone, Utc};

    const TTL: Duration = Duration::from_secs(3600);

    fn tile() -> TileId {
        TileIndex::default().tile_of(&Coordinate::new(40.0, -73.0))
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_record_is_uncovered() {
        assert_eq!(classify(None, 100.0, t0(), TTL), TileFreshness::Uncovered);
    }

    #[test]
    fn test_fresh_requires_age_and_radius() {
        let rec = CacheRecord::new(tile(), 2_000.0, t0());
        assert_eq!(classify(Some(&rec), 2_000.0, t0(), TTL), TileFreshness::Fresh);
        assert_eq!(classify(Some(&rec), 2_000.1, t0(), TTL), TileFreshness::Stale);

        let later = t0() + chrono::Duration::seconds(3600);
        assert_eq!(classify(Some(&rec), 100.0, later, TTL), TileFreshness::Stale);
        let just_before = t0() + chrono::Duration::seconds(3599);
        assert_eq!(classify(Some(&rec), 100.0, just_before, TTL), TileFreshness::Fresh);
    }

    #[test]
    fn test_refreshed_keeps_larger_radius_within_ttl() {
        let rec = CacheRecord::new(tile(), 5_000.0, t0());
        let now = t0() + chrono::Duration::minutes(10);
        let next = rec.refreshed(1_000.0, now, TTL);
        assert_eq!(next.radius_covered_meters, 5_000.0);
        assert_eq!(next.last_queried_at, now);
    }

    #[test]
    fn test_refreshed_replaces_expired_radius() {
        let rec = CacheRecord::new(tile(), 5_000.0, t0());
        let now = t0() + chrono::Duration::hours(2);
        let next = rec.refreshed(1_000.0, now, TTL);
        assert_eq!(next.radius_covered_meters, 1_000.0);
    }

    #[test]
    fn test_future_record_has_zero_age() {
        let rec = CacheRecord::new(tile(), 1.0, t0() + chrono::Duration::hours(1));
        assert_eq!(rec.age(t0()), Duration::ZERO);
        assert!(!TileFreshness::Fresh.needs_fetch());
        assert!(TileFreshness::Stale.needs_fetch());
    }

    #[test]
    fn test_ledger_key_normalizes_keyword() {
        let key = LedgerKey::scoped(tile(), Some("  Yoga "));
        assert_eq!(key.keyword.as_deref(), Some("yoga"));
        assert_eq!(key, LedgerKey::scoped(tile(), Some("YOGA")));
        assert_eq!(LedgerKey::scoped(tile(), Some("   ")), LedgerKey::from(tile()));
        assert_ne!(key, LedgerKey::from(tile()));
    }

    #[test]
    fn test_ledger_key_encoding_extends_tile_key() {
        let plain = LedgerKey::from(tile());
        assert_eq!(plain.encode(), tile().encode().to_vec());

        let scoped = LedgerKey::scoped(tile(), Some("yoga"));
        let bytes = scoped.encode();
        assert_eq!(&bytes[..12], &tile().encode()[..]);
        assert_eq!(&bytes[12..], b"yoga");
    }

    #[test]
    fn test_scoped_record_keeps_keyword_when_refreshed() {
        let key = LedgerKey::scoped(tile(), Some("yoga"));
        let rec = CacheRecord::for_key(key.clone(), 2_000.0, t0());
        let next = rec.refreshed(3_000.0, t0() + chrono::Duration::minutes(1), TTL);
        assert_eq!(next.key(), key);

        let json = serde_json::to_value(CacheRecord::new(tile(), 1.0, t0())).unwrap();
        assert!(json.get("keyword").is_none());
    }
}
