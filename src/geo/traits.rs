//! Geolocation lookup trait abstraction
//!
//! The resolver only ever talks to `GeoLookup`, so tests swap in
//! `MockGeoLookup` and never touch the network.

use async_trait::async_trait;

/// Result type for geolocation lookups
pub type GeoResult<T> = Result<T, GeoError>;

/// Geolocation lookup errors
///
/// These never escape the resolver; they are logged and turned into an
/// absent country code.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {0}")]
    Status(u16),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Lookup timed out")]
    Timeout,
}

/// External country-code lookup for a single address.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Resolve `origin` to an ISO country code (e.g. `"FR"`).
    async fn country_code(&self, origin: &str) -> GeoResult<String>;
}
