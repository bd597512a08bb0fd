//! Google Places Nearby Search response types

use placecache_core::{Coordinate, ProviderAttributes, Timestamp, VenueRecord};
use serde::Deserialize;

// ============================================================================
// NEARBY SEARCH TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NearbySearchResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<PlaceResult>,
    pub error_message: Option<String>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceResult {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub vicinity: Option<String>,
    pub formatted_address: Option<String>,
    pub geometry: Option<Geometry>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    pub opening_hours: Option<OpeningHours>,
    pub business_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Photo {
    pub photo_reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpeningHours {
    pub open_now: Option<bool>,
}

impl PlaceResult {
    /// Map into a provider-origin venue. Results without an id or a usable
    /// location are dropped.
    pub fn into_venue(self, synced_at: Timestamp) -> Option<VenueRecord> {
        let place_id = self.place_id.filter(|id| !id.trim().is_empty())?;
        let location = self.geometry.map(|g| Coordinate::new(g.location.lat, g.location.lng))?;
        if !location.is_valid() {
            return None;
        }

        let attributes = ProviderAttributes {
            rating: self.rating,
            user_ratings_total: self.user_ratings_total,
            types: self.types,
            photo_reference: self.photos.into_iter().find_map(|p| p.photo_reference),
            open_now: self.opening_hours.and_then(|h| h.open_now),
            business_status: self.business_status,
            synced_at: None,
        };

        let mut venue = VenueRecord::from_provider(
            place_id,
            self.name.unwrap_or_default(),
            location,
            attributes,
            synced_at,
        );
        venue.address = self.vicinity.or(self.formatted_address);
        Some(venue)
    }
}
