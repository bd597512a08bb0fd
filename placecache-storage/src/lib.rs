//! placecache Storage - Venue Store and Tile Ledger
//!
//! Defines the persistence seams of the discovery cache:
//! - [`EntityStore`]: deduplicated venue records with ownership-aware merges
//! - [`TileCacheLedger`]: per-tile provider query records and single-flight
//!   fetch claims
//!
//! Both come with an in-memory implementation for tests and an LMDB
//! implementation for deployments.

pub mod entity_store;
pub mod ledger;
pub mod lmdb;
pub mod single_flight;

pub use entity_store::{EntityStore, InMemoryEntityStore, UpsertOutcome, UpsertSummary};
pub use ledger::{InMemoryTileLedger, TileCacheLedger, TileLedgerBackend};
pub use lmdb::{LmdbEntityStore, LmdbStoreError, LmdbTileLedger, DEFAULT_MAP_SIZE_MB};
pub use single_flight::{FetchClaim, FetchGuard, FetchWaiter, SingleFlight};
