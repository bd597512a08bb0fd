//! Text matching and result ordering.
//!
//! Matching is case-insensitive on the trimmed query. A venue matches when
//! the query equals its name, prefixes it, occurs in it, or occurs in its
//! address, scored in that order.

use std::cmp::Ordering;

use placecache_core::VenueRecord;
use serde::{Deserialize, Serialize};

/// How well a venue matched the text filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRank {
    /// No text filter was given.
    Unfiltered = 0,
    AddressContains = 1,
    NameContains = 2,
    NamePrefix = 3,
    NameExact = 4,
}

impl MatchRank {
    pub fn score(self) -> u8 {
        self as u8
    }
}

/// A normalized text filter. Empty input means no filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    needle: Option<String>,
}

impl TextQuery {
    pub fn new(text: Option<&str>) -> Self {
        let needle = text
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());
        Self { needle }
    }

    pub fn is_empty(&self) -> bool {
        self.needle.is_none()
    }

    /// The normalized query text, if any.
    pub fn as_str(&self) -> Option<&str> {
        self.needle.as_deref()
    }

    /// Rank `venue`, or `None` when it does not match.
    pub fn rank(&self, venue: &VenueRecord) -> Option<MatchRank> {
        let Some(needle) = &self.needle else {
            return Some(MatchRank::Unfiltered);
        };

        let name = venue.name.to_lowercase();
        if name == *needle {
            return Some(MatchRank::NameExact);
        }
        if name.starts_with(needle.as_str()) {
            return Some(MatchRank::NamePrefix);
        }
        if name.contains(needle.as_str()) {
            return Some(MatchRank::NameContains);
        }
        match &venue.address {
            Some(address) if address.to_lowercase().contains(needle.as_str()) => {
                Some(MatchRank::AddressContains)
            }
            _ => None,
        }
    }
}

/// Result ordering: rank descending, then distance ascending, then id.
pub fn compare_hits(
    a_rank: MatchRank,
    a_distance: f64,
    a_venue: &VenueRecord,
    b_rank: MatchRank,
    b_distance: f64,
    b_venue: &VenueRecord,
) -> Ordering {
    b_rank
        .cmp(&a_rank)
        .then_with(|| a_distance.total_cmp(&b_distance))
        .then_with(|| a_venue.venue_id.cmp(&b_venue.venue_id))
}
