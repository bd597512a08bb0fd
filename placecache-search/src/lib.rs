//! placecache Search - Discovery Cache Front Door
//!
//! [`SearchCoordinator`] answers venue searches around a coordinate while
//! keeping provider calls to a minimum:
//!
//! 1. Validate the request.
//! 2. Unless local-only, cover the disc with tiles and classify each against
//!    the tile ledger.
//! 3. Fetch stale and uncovered tiles from the provider, one fetch per tile
//!    across all concurrent searches, and upsert the results.
//! 4. Read the disc from the venue store, filter, rank and truncate.
//!
//! Administrative operations (clearing venues or the tile cache, status) live
//! on the coordinator as well.

pub mod admin;
pub mod coordinator;
pub mod gate;
pub mod ranking;

pub use admin::StatusReport;
pub use coordinator::{SearchCoordinator, SearchHit, SearchRequest, SearchResult};
pub use gate::LocalOnlyGate;
pub use ranking::{MatchRank, TextQuery};
