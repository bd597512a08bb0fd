//! placecache Test Utilities
//!
//! Shared test infrastructure for the placecache workspace:
//! - Proptest generators for coordinates, radii and venue records
//! - Deterministic venue catalogues and timestamps
//! - Assertions for error kinds and result ordering

// Re-export the mock provider from its source crate
pub use placecache_provider::{MockPlaceProvider, ProviderCall};

// Re-export core types for convenience
pub use placecache_core::{
    Clock, Coordinate, DiscoveryConfig, DiscoveryError, DiscoveryResult, LocalAttributes,
    ManualClock, Origin, ProviderAttributes, ProviderError, StorageError, TileId, TileIndex,
    Timestamp, ValidationError, VenueId, VenueRecord,
};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for placecache types.

    use super::*;
    use proptest::prelude::*;

    /// Coordinate away from the poles, where tile covers stay small.
    pub fn arb_coordinate() -> impl Strategy<Value = Coordinate> {
        (-80.0f64..80.0, -180.0f64..180.0).prop_map(|(lat, lng)| Coordinate::new(lat, lng))
    }

    /// Coordinate near a center, at most `max_offset_m` away.
    pub fn arb_coordinate_near(
        center: Coordinate,
        max_offset_m: f64,
    ) -> impl Strategy<Value = Coordinate> {
        (0.0f64..360.0, 0.0f64..=max_offset_m)
            .prop_map(move |(bearing, distance)| center.destination(bearing, distance))
    }

    /// Search radius between 50 m and 20 km.
    pub fn arb_radius() -> impl Strategy<Value = f64> {
        50.0f64..20_000.0
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_600_000_000i64..1_900_000_000).prop_map(|secs| {
            chrono::DateTime::<chrono::Utc>::UNIX_EPOCH + chrono::Duration::seconds(secs)
        })
    }

    pub fn arb_venue_id() -> impl Strategy<Value = VenueId> {
        "[a-zA-Z0-9_-]{6,27}".prop_map(VenueId::new)
    }

    pub fn arb_origin() -> impl Strategy<Value = Origin> {
        prop_oneof![Just(Origin::Provider), Just(Origin::Local)]
    }

    pub fn arb_provider_attributes() -> impl Strategy<Value = ProviderAttributes> {
        (
            proptest::option::of(1.0f64..5.0),
            proptest::option::of(0u32..10_000),
            proptest::collection::vec("[a-z_]{3,12}", 0..4),
            proptest::option::of(any::<bool>()),
        )
            .prop_map(|(rating, user_ratings_total, types, open_now)| ProviderAttributes {
                rating,
                user_ratings_total,
                types,
                photo_reference: None,
                open_now,
                business_status: Some("OPERATIONAL".to_string()),
                synced_at: None,
            })
    }

    pub fn arb_local_attributes() -> impl Strategy<Value = LocalAttributes> {
        (
            proptest::option::of("[a-zA-Z ]{0,40}"),
            proptest::option::of(1.0f64..5.0),
            0u32..500,
        )
            .prop_map(|(description, average_rating, review_count)| LocalAttributes {
                description,
                average_rating,
                review_count,
            })
    }

    /// Venue record of either origin somewhere near `center`.
    pub fn arb_venue_near(
        center: Coordinate,
        max_offset_m: f64,
    ) -> impl Strategy<Value = VenueRecord> {
        (
            arb_venue_id(),
            "[A-Z][a-z]{2,10}( [A-Z][a-z]{2,10})?",
            arb_coordinate_near(center, max_offset_m),
            arb_origin(),
            arb_provider_attributes(),
            arb_local_attributes(),
            arb_timestamp(),
        )
            .prop_map(|(id, name, location, origin, provider, local, at)| match origin {
                Origin::Provider => VenueRecord::from_provider(id, name, location, provider, at),
                Origin::Local => VenueRecord::local(id, name, location, local, at),
            })
    }

    pub fn arb_venue() -> impl Strategy<Value = VenueRecord> {
        arb_coordinate().prop_flat_map(|center| arb_venue_near(center, 1.0))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Deterministic data for scenario tests.

    use super::*;

    const NAMES: [&str; 5] = [
        "Iron Temple",
        "Cardio Club",
        "Yoga Loft",
        "Power House",
        "Climb Gym",
    ];

    /// Golden angle in degrees; spreads catalogue venues evenly.
    const GOLDEN_ANGLE_DEG: f64 = 137.507_764;

    /// Fixed instant (2024-01-01T00:00:00Z) used as the start of test time.
    pub fn epoch() -> Timestamp {
        chrono::DateTime::<chrono::Utc>::UNIX_EPOCH + chrono::Duration::seconds(1_704_067_200)
    }

    /// Manual clock starting at [`epoch`].
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(epoch())
    }

    pub fn venue_at(id: &str, name: &str, location: Coordinate) -> VenueRecord {
        VenueRecord::from_provider(id, name, location, ProviderAttributes::default(), epoch())
    }

    pub fn local_venue_at(id: &str, name: &str, location: Coordinate) -> VenueRecord {
        VenueRecord::local(id, name, location, LocalAttributes::default(), epoch())
    }

    /// `count` provider venues on a sunflower spiral around `center`, the
    /// outermost at `max_radius_m`. Ids are `venue-0000`, `venue-0001`, ...
    pub fn catalogue_around(
        center: Coordinate,
        count: usize,
        max_radius_m: f64,
    ) -> Vec<VenueRecord> {
        (0..count)
            .map(|i| {
                let fraction = ((i as f64 + 0.5) / count as f64).sqrt();
                let location = center.destination(
                    (i as f64 * GOLDEN_ANGLE_DEG) % 360.0,
                    fraction * max_radius_m,
                );
                let name = format!("{} {}", NAMES[i % NAMES.len()], i);
                venue_at(&format!("venue-{:04}", i), &name, location)
            })
            .collect()
    }

    /// Catalogue venues inside the disc, the way an exhaustive search
    /// would return them.
    pub fn venues_within(
        catalogue: &[VenueRecord],
        center: &Coordinate,
        radius_m: f64,
    ) -> Vec<VenueId> {
        let mut ids: Vec<VenueId> = catalogue
            .iter()
            .filter(|v| center.distance_to(&v.location) <= radius_m)
            .map(|v| v.venue_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Default configuration with a fixed 24 hour TTL and no environment input.
    pub fn test_config() -> DiscoveryConfig {
        DiscoveryConfig::default()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for placecache results.

    use super::*;

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &DiscoveryResult<T>) {
        assert!(
            matches!(result, Err(DiscoveryError::Validation(_))),
            "Expected validation error, got {:?}",
            result
        );
    }

    pub fn assert_provider_error<T: std::fmt::Debug>(result: &DiscoveryResult<T>) {
        assert!(
            matches!(result, Err(DiscoveryError::Provider(_))),
            "Expected provider error, got {:?}",
            result
        );
    }

    pub fn assert_storage_error<T: std::fmt::Debug>(result: &DiscoveryResult<T>) {
        assert!(
            matches!(result, Err(DiscoveryError::Storage(_))),
            "Expected storage error, got {:?}",
            result
        );
    }

    /// Distances must be non-decreasing.
    pub fn assert_sorted_by_distance(distances: &[f64]) {
        for pair in distances.windows(2) {
            assert!(
                pair[0] <= pair[1],
                "Distances out of order: {} before {}",
                pair[0],
                pair[1]
            );
        }
    }

    pub fn assert_unique_ids<'a>(ids: impl IntoIterator<Item = &'a VenueId>) {
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            assert!(seen.insert(id), "Duplicate venue id {}", id);
        }
    }
}
