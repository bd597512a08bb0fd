//! Google Places provider implementation

pub mod client;
pub mod types;

pub use client::{GooglePlacesConfig, GooglePlacesProvider, DEFAULT_BASE_URL, DEFAULT_VENUE_TYPE};
