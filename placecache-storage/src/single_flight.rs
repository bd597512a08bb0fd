//! Per-tile fetch deduplication.
//!
//! Claims are made on a [`LedgerKey`], so a keyword-filtered fetch and an
//! unfiltered fetch of the same tile do not wait on each other. The first
//! caller to claim a key becomes the leader and holds a
//! [`FetchGuard`]. Callers arriving while the guard is alive become followers
//! and wait for it to drop. Dropping the guard (normal return, error, panic or
//! task cancellation) always wakes every follower.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use placecache_core::LedgerKey;
use tokio::sync::watch;

type Flights = Arc<DashMap<LedgerKey, watch::Sender<bool>>>;

/// Registry of tiles with a provider fetch in flight.
#[derive(Debug, Default, Clone)]
pub struct SingleFlight {
    flights: Flights,
}

/// Result of claiming a tile.
#[derive(Debug)]
pub enum FetchClaim {
    /// This caller fetches; followers are released when the guard drops.
    Leader(FetchGuard),
    /// Another caller is fetching; wait for it.
    Follower(FetchWaiter),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `key`.
    pub fn claim(&self, key: LedgerKey) -> FetchClaim {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => FetchClaim::Follower(FetchWaiter {
                key,
                done: entry.get().subscribe(),
            }),
            Entry::Vacant(entry) => {
                let (tx, _rx) = watch::channel(false);
                entry.insert(tx);
                FetchClaim::Leader(FetchGuard {
                    key,
                    flights: Arc::clone(&self.flights),
                })
            }
        }
    }

    /// Number of tiles currently being fetched.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

/// Leadership of one tile fetch.
#[derive(Debug)]
pub struct FetchGuard {
    key: LedgerKey,
    flights: Flights,
}

impl FetchGuard {
    pub fn key(&self) -> &LedgerKey {
        &self.key
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if let Some((_, done)) = self.flights.remove(&self.key) {
            done.send_replace(true);
        }
    }
}

/// Handle a follower awaits.
#[derive(Debug)]
pub struct FetchWaiter {
    key: LedgerKey,
    done: watch::Receiver<bool>,
}

impl FetchWaiter {
    pub fn key(&self) -> &LedgerKey {
        &self.key
    }

    /// Resolve once the leader releases the tile.
    pub async fn wait(mut self) {
        // A closed channel also means the leader is gone.
        let _ = self.done.wait_for(|done| *done).await;
    }
}
