//! Venue records and the ownership-aware merge applied on every upsert.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::Timestamp;

/// Provider-assigned venue identifier. Globally unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VenueId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Who created a venue record and therefore owns its core fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Discovered through the external place-search provider.
    Provider,
    /// Contributed by a local user.
    Local,
}

/// Attributes only a provider sync may write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttributes {
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub types: Vec<String>,
    pub photo_reference: Option<String>,
    pub open_now: Option<bool>,
    pub business_status: Option<String>,
    /// Fetch time of these attributes when they enrich a locally owned venue,
    /// whose `last_synced_at` tracks contributions instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<Timestamp>,
}

/// Attributes only a local contribution may write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalAttributes {
    pub description: Option<String>,
    pub average_rating: Option<f64>,
    pub review_count: u32,
}

/// A discovered or contributed venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub venue_id: VenueId,
    pub name: String,
    pub address: Option<String>,
    pub location: Coordinate,
    pub origin: Origin,
    /// Provider attributes, present once any provider sync has seen the venue.
    pub provider: Option<ProviderAttributes>,
    #[serde(default)]
    pub local: LocalAttributes,
    /// Time of the provider fetch for provider-owned venues, or of the latest
    /// contribution for locally owned ones.
    pub last_synced_at: Timestamp,
}

/// What an upsert did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The stored record changed.
    Updated,
    /// The incoming record carried nothing the stored record may accept.
    Ignored,
}

impl VenueRecord {
    /// Record as mapped from a provider response.
    pub fn from_provider(
        venue_id: impl Into<VenueId>,
        name: impl Into<String>,
        location: Coordinate,
        attributes: ProviderAttributes,
        synced_at: Timestamp,
    ) -> Self {
        Self {
            venue_id: venue_id.into(),
            name: name.into(),
            address: None,
            location,
            origin: Origin::Provider,
            provider: Some(attributes),
            local: LocalAttributes::default(),
            last_synced_at: synced_at,
        }
    }

    /// Record for a local contribution.
    pub fn local(
        venue_id: impl Into<VenueId>,
        name: impl Into<String>,
        location: Coordinate,
        attributes: LocalAttributes,
        contributed_at: Timestamp,
    ) -> Self {
        Self {
            venue_id: venue_id.into(),
            name: name.into(),
            address: None,
            location,
            origin: Origin::Local,
            provider: None,
            local: attributes,
            last_synced_at: contributed_at,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Merge `incoming` (same venue id) into `self`.
    ///
    /// Core fields belong to the stored record's origin. Provider data only
    /// replaces provider data that is not newer; local data is always
    /// accepted from a local contribution and never touched by a provider sync.
    pub fn absorb(&mut self, incoming: VenueRecord) -> MergeOutcome {
        debug_assert_eq!(self.venue_id, incoming.venue_id);

        match (self.origin, incoming.origin) {
            (Origin::Provider, Origin::Provider) => {
                if incoming.last_synced_at < self.last_synced_at {
                    return MergeOutcome::Ignored;
                }
                self.name = incoming.name;
                self.address = incoming.address;
                self.location = incoming.location;
                self.provider = incoming.provider;
                self.last_synced_at = incoming.last_synced_at;
                MergeOutcome::Updated
            }
            (Origin::Local, Origin::Provider) => {
                // The provider may enrich a local venue but never renames or
                // moves it.
                let synced_at = incoming.last_synced_at;
                let current = self.provider.as_ref().and_then(|p| p.synced_at);
                if current.is_some_and(|current| synced_at < current) {
                    return MergeOutcome::Ignored;
                }
                self.provider = incoming.provider.map(|attributes| ProviderAttributes {
                    synced_at: Some(synced_at),
                    ..attributes
                });
                MergeOutcome::Updated
            }
            (Origin::Provider, Origin::Local) => {
                if self.local == incoming.local {
                    return MergeOutcome::Ignored;
                }
                self.local = incoming.local;
                MergeOutcome::Updated
            }
            (Origin::Local, Origin::Local) => {
                let provider = self.provider.take();
                *self = incoming;
                self.provider = provider;
                MergeOutcome::Updated
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
