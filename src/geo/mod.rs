//! Geolocation enrichment.
//!
//! Country codes are annotations only. Nothing here can change an
//! allow/deny decision, and the gate never waits on a lookup.

pub mod ip_api;
pub mod mock;
pub mod resolver;
pub mod traits;

pub use ip_api::{IpApiLookup, DEFAULT_API_URL};
pub use mock::MockGeoLookup;
pub use resolver::{GeoResolver, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_TTL};
pub use traits::{GeoError, GeoLookup, GeoResult};
