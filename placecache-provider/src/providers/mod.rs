//! Place-search provider implementations
//!
//! This module contains concrete implementations of the PlaceProvider trait
//! and the error constructors they share.

pub mod google_places;

pub use google_places::{GooglePlacesConfig, GooglePlacesProvider};

use placecache_core::ProviderError;

pub(crate) fn unavailable(provider: &str, reason: impl Into<String>) -> ProviderError {
    ProviderError::Unavailable {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn quota_exceeded(provider: &str, retry_after_ms: Option<u64>) -> ProviderError {
    ProviderError::QuotaExceeded {
        provider: provider.to_string(),
        retry_after_ms,
    }
}

pub(crate) fn bad_request(provider: &str, reason: impl Into<String>) -> ProviderError {
    ProviderError::BadRequest {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}
