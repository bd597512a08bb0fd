//! Property-Based Tests for Search Completeness and Call Accounting
//!
//! **Property 1: Completeness**
//!
//! For any disc inside the fixture area, a search returns exactly the
//! catalogue venues inside the disc, nearest first.
//!
//! **Property 2: Incremental fetching**
//!
//! After a search of radius r1, a concentric search of radius r2 >= r1
//! calls the provider once for each tile in cover(r2) \ cover(r1) and
//! never for tiles already covered.

use placecache_search::SearchRequest;
use placecache_test_utils::assertions::assert_sorted_by_distance;
use placecache_test_utils::fixtures::{test_config, venues_within};
use placecache_test_utils::generators::arb_coordinate_near;
use proptest::prelude::*;
use tokio::runtime::Runtime;

#[path = "support/harness.rs"]
mod harness;
use harness::{hit_distances, hit_ids, scenario_center, Harness};

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_search_returns_exactly_the_disc(
        center in arb_coordinate_near(scenario_center(), 10_000.0),
        radius in 200.0f64..8_000.0,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = Harness::new(test_config());
            let result = h
                .coordinator
                .search(SearchRequest::new(center, radius))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(hit_ids(&result), venues_within(&h.catalogue, &center, radius));
            assert_sorted_by_distance(&hit_distances(&result));
            prop_assert_eq!(h.take_calls(), h.cover(&center, radius).len());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_growth_fetches_only_new_tiles(
        center in arb_coordinate_near(scenario_center(), 5_000.0),
        r1 in 4_000.0f64..8_000.0,
        extra in 0.0f64..10_000.0,
    ) {
        let r2 = r1 + extra;
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = Harness::new(test_config());
            h.coordinator
                .search(SearchRequest::new(center, r1))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            h.take_calls();

            let result = h
                .coordinator
                .search(SearchRequest::new(center, r2))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let before = h.cover(&center, r1);
            let after = h.cover(&center, r2);
            prop_assert!(before.is_subset(&after));
            let new_tiles = after.difference(&before).count();
            prop_assert_eq!(h.take_calls(), new_tiles);
            prop_assert_eq!(result.provider_calls, new_tiles);
            prop_assert_eq!(hit_ids(&result), venues_within(&h.catalogue, &center, r2));
            Ok::<(), TestCaseError>(())
        })?;
    }
}
