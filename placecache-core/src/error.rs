//! Error types for placecache operations

use std::time::Duration;
use thiserror::Error;

/// Errors raised by an external place-search provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure, timeout or a provider-side fault. Retryable.
    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    /// The provider refused the call because the billing quota is spent.
    #[error("Provider {provider} quota exceeded (retry after {retry_after_ms:?}ms)")]
    QuotaExceeded {
        provider: String,
        retry_after_ms: Option<u64>,
    },

    /// The provider rejected the request itself. Not retryable.
    #[error("Provider {provider} rejected request: {reason}")]
    BadRequest { provider: String, reason: String },
}

impl ProviderError {
    /// Timeout error for a call that exceeded its deadline.
    pub fn timed_out(provider: impl Into<String>, after: Duration) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            reason: format!("timed out after {}ms", after.as_millis()),
        }
    }

    /// Returns true when a later retry of the same call may succeed.
    ///
    /// Quota exhaustion counts as transient here; backing off longer than a
    /// plain timeout is left to an outer rate limiter.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::QuotaExceeded { .. })
    }
}

/// Storage layer errors (venue store and tile ledger).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid search request, {field}: {reason}")]
    InvalidSearchRequest { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSearchRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all placecache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DiscoveryError {
    /// Returns true for errors a caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_transient(),
            Self::Storage(StorageError::Unavailable { .. }) => true,
            _ => false,
        }
    }
}

/// Result type alias for placecache operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

// =============================================================================
// TESTS
// =============================================================================
