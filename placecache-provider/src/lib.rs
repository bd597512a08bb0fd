//! placecache Provider - External Place Search
//!
//! Provider-agnostic trait for place search plus the concrete adapters.
//! A provider is the only component that performs outbound calls. It maps
//! raw payloads into [`VenueRecord`]s at this boundary and never caches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use placecache_core::{Clock, Coordinate, ProviderError, SystemClock, VenueRecord};

pub mod providers;

pub use providers::{GooglePlacesConfig, GooglePlacesProvider};

// ============================================================================
// PLACE PROVIDER TRAIT
// ============================================================================

/// Trait for place-search providers.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PlaceProvider: Send + Sync {
    /// Provider identifier used in errors and logs.
    fn name(&self) -> &str;

    /// Venues within `radius_m` meters of `center`, optionally narrowed by a
    /// free-text keyword. Exactly one billable call per invocation.
    ///
    /// # Returns
    /// * `Ok(Vec<VenueRecord>)` - Provider-origin records stamped with the fetch time
    /// * `Err(ProviderError::Unavailable)` - Network failure or provider fault
    /// * `Err(ProviderError::QuotaExceeded)` - Billing quota spent
    /// * `Err(ProviderError::BadRequest)` - The provider rejected the request
    async fn fetch(
        &self,
        center: &Coordinate,
        radius_m: f64,
        keyword: Option<&str>,
    ) -> Result<Vec<VenueRecord>, ProviderError>;
}

// ============================================================================
// MOCK PROVIDER FOR TESTING
// ============================================================================

/// One recorded `fetch` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCall {
    pub center: Coordinate,
    pub radius_m: f64,
    pub keyword: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    catalogue: Vec<VenueRecord>,
    calls: Vec<ProviderCall>,
    failures: Vec<(Coordinate, ProviderError)>,
    fail_all: Option<ProviderError>,
}

/// Calls whose center lies within this distance of a scripted failure point fail.
const FAILURE_MATCH_METERS: f64 = 1.0;

/// In-process provider backed by a fixed venue catalogue.
///
/// Returns the catalogue venues inside the requested disc (and matching the
/// keyword, if any), restamped with the current time. Counts and records
/// every call.
pub struct MockPlaceProvider {
    state: RwLock<MockState>,
    call_count: AtomicUsize,
    latency: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl MockPlaceProvider {
    pub fn new(catalogue: Vec<VenueRecord>) -> Self {
        Self {
            state: RwLock::new(MockState {
                catalogue,
                ..Default::default()
            }),
            call_count: AtomicUsize::new(0),
            latency: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Stamp returned venues with this clock instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> std::sync::RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add venues to the catalogue.
    pub fn extend_catalogue(&self, venues: impl IntoIterator<Item = VenueRecord>) {
        self.state_mut().catalogue.extend(venues);
    }

    /// Fail calls centered on `point` with `error`.
    pub fn fail_near(&self, point: Coordinate, error: ProviderError) {
        self.state_mut().failures.push((point, error));
    }

    /// Fail every call with `error`.
    pub fn fail_always(&self, error: ProviderError) {
        self.state_mut().fail_all = Some(error);
    }

    /// Remove all scripted failures.
    pub fn clear_failures(&self) {
        let mut state = self.state_mut();
        state.failures.clear();
        state.fail_all = None;
    }

    /// Number of `fetch` calls so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.state_mut().calls.clear();
    }
}

impl std::fmt::Debug for MockPlaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlaceProvider")
            .field("catalogue", &self.state().catalogue.len())
            .field("call_count", &self.call_count())
            .field("latency", &self.latency)
            .finish()
    }
}

#[async_trait]
impl PlaceProvider for MockPlaceProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        center: &Coordinate,
        radius_m: f64,
        keyword: Option<&str>,
    ) -> Result<Vec<VenueRecord>, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.state_mut().calls.push(ProviderCall {
            center: *center,
            radius_m,
            keyword: keyword.map(str::to_string),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let synced_at = self.clock.now();
        let state = self.state();
        if let Some(err) = &state.fail_all {
            return Err(err.clone());
        }
        if let Some((_, err)) = state
            .failures
            .iter()
            .find(|(point, _)| point.distance_to(center) <= FAILURE_MATCH_METERS)
        {
            return Err(err.clone());
        }

        let keyword = keyword.map(|k| k.trim().to_lowercase()).filter(|k| !k.is_empty());
        Ok(state
            .catalogue
            .iter()
            .filter(|v| center.distance_to(&v.location) <= radius_m)
            .filter(|v| match &keyword {
                Some(k) => v.name.to_lowercase().contains(k.as_str()),
                None => true,
            })
            .map(|v| {
                let mut venue = v.clone();
                venue.last_synced_at = synced_at;
                venue
            })
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
