//! Mock geolocation lookup for testing.

use super::traits::{GeoError, GeoLookup, GeoResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock lookup that answers from a table and counts every call.
#[derive(Clone, Default)]
pub struct MockGeoLookup {
    state: Arc<Mutex<MockState>>,
    calls: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockState {
    countries: HashMap<String, String>,
    failing: bool,
    delay: Option<Duration>,
}

impl MockGeoLookup {
    /// Create new mock lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `origin` with `country` (for test setup).
    pub fn set_country(&self, origin: &str, country: &str) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        s.countries.insert(origin.to_string(), country.to_string());
    }

    /// Make every lookup fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).failing = failing;
    }

    /// Sleep before answering (to exercise timeouts).
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).delay = Some(delay);
    }

    /// Number of external calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLookup for MockGeoLookup {
    async fn country_code(&self, origin: &str) -> GeoResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (answer, delay) = {
            let s = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let answer = if s.failing {
                Err(GeoError::Network("mock failure".to_string()))
            } else {
                s.countries
                    .get(origin)
                    .cloned()
                    .ok_or_else(|| GeoError::Api("unknown origin".to_string()))
            };
            (answer, s.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }
}
