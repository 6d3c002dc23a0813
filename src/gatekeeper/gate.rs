//! Access Gate: per-login allow/deny decision
//!
//! Two states per attempt, decided from the registration store:
//!
//! ```text
//! UnknownIdentity --register_primary--> Allow
//!        |  (lost race: someone registered first)
//!        v
//! KnownIdentity --is_allowed--> Allow
//!               \-------------> Deny + denial record
//! ```
//!
//! The first-contact path is the only one that creates a registration
//! record. Geographic enrichment is read from the resolver's cache only; on a
//! miss a detached lookup warms the cache for next time. The decision never
//! waits on the network.

use super::access_history::{AccessHistory, AccessOutcome};
use super::audit_trail::AuditLog;
use crate::geo::GeoResolver;
use crate::identity::{Identity, Origin};
use crate::persistence::RegistrationStore;
use std::cell::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};

/// Default cap on origins per identity.
pub const DEFAULT_MAX_ORIGINS: usize = 2;

/// Default rejection message shown to a denied player.
pub const DEFAULT_REJECTION_MESSAGE: &str = "Unauthorized IP address\n\
This IP is not registered for your account\n\
Contact an administrator if you need help";

/// Registration state of the identity behind a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No registration record exists yet.
    UnknownIdentity,
    /// At least one approved origin is registered.
    KnownIdentity,
}

/// Outcome of a pre-authentication check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Rejected, with the message to show the player.
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Gate policy knobs, taken from configuration.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub max_origins: usize,
    /// Emit a warning log line for every denial.
    pub log_denials: bool,
    /// Supports `{origin}`, `{count}` and `{max}` placeholders.
    pub rejection_message: String,
    /// Annotate denials and history with cached country codes.
    pub enrich_country: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            max_origins: DEFAULT_MAX_ORIGINS,
            log_denials: true,
            rejection_message: DEFAULT_REJECTION_MESSAGE.to_string(),
            enrich_country: true,
        }
    }
}

/// Decision core invoked for every login attempt.
pub struct AccessGate {
    store: Arc<RegistrationStore>,
    audit: Arc<AuditLog>,
    history: Option<Arc<AccessHistory>>,
    geo: Option<Arc<GeoResolver>>,
    policy: GatePolicy,
}

impl AccessGate {
    pub fn new(store: Arc<RegistrationStore>, audit: Arc<AuditLog>, policy: GatePolicy) -> Self {
        Self {
            store,
            audit,
            history: None,
            geo: None,
            policy,
        }
    }

    /// Attach a resolver for best-effort country enrichment.
    pub fn with_geo(mut self, geo: Arc<GeoResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Record every attempt in a per-identity access history.
    pub fn with_history(mut self, history: Arc<AccessHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Classify the identity behind an attempt.
    pub fn state_of(&self, identity: &Identity) -> GateState {
        if self.store.has_identity(identity) {
            GateState::KnownIdentity
        } else {
            GateState::UnknownIdentity
        }
    }

    /// Decide whether `identity` may log in from `origin`.
    ///
    /// `origin` must already be validated by the connection boundary.
    pub fn on_pre_authentication(
        &self,
        identity: Identity,
        origin: &Origin,
        display_name: &str,
    ) -> Decision {
        // One hint per attempt, shared by the denial record and the history.
        let hint = OnceCell::new();

        let decision = match self.state_of(&identity) {
            GateState::UnknownIdentity => {
                if self.store.register_primary(identity, origin.clone()) {
                    info!(player = %display_name, identity = %identity, origin = %origin, "first IP registered");
                    Decision::Allow
                } else {
                    self.decide_known(identity, origin, display_name, &hint)
                }
            }
            GateState::KnownIdentity => self.decide_known(identity, origin, display_name, &hint),
        };

        if let Some(history) = &self.history {
            let outcome = if decision.is_allowed() {
                AccessOutcome::Allowed
            } else {
                AccessOutcome::Denied
            };
            let country = hint.get_or_init(|| self.country_hint(origin)).clone();
            history.record(identity, origin, display_name, outcome, country);
        }

        decision
    }

    /// Fallback registration after a completed login, for when the
    /// pre-authentication hook was bypassed. Idempotent for known identities.
    ///
    /// Returns `true` only if a primary origin was registered now.
    pub fn on_authenticated(&self, identity: Identity, origin: &Origin) -> bool {
        if self.store.has_identity(&identity) {
            return false;
        }
        let registered = self.store.register_primary(identity, origin.clone());
        if registered {
            info!(identity = %identity, origin = %origin, "first IP registered after login");
        }
        registered
    }

    fn decide_known(
        &self,
        identity: Identity,
        origin: &Origin,
        display_name: &str,
        hint: &OnceCell<Option<String>>,
    ) -> Decision {
        if self.store.is_allowed(&identity, origin) {
            return Decision::Allow;
        }

        let count = self.store.count_of(&identity);
        let max = self.policy.max_origins;
        let reason = format!("IP not registered ({count}/{max} IPs used)");

        self.audit.record(
            identity,
            display_name,
            origin,
            &reason,
            hint.get_or_init(|| self.country_hint(origin)).clone(),
        );

        if self.policy.log_denials {
            warn!(player = %display_name, identity = %identity, origin = %origin, reason = %reason, "connection denied");
        }

        Decision::Deny(render_message(&self.policy.rejection_message, origin, count, max))
    }

    /// Cached country for `origin`, if enrichment is on.
    ///
    /// On a cache miss, spawns a detached lookup when a tokio runtime is
    /// available. Its result only lands in the cache.
    fn country_hint(&self, origin: &Origin) -> Option<String> {
        if !self.policy.enrich_country {
            return None;
        }
        let geo = self.geo.as_ref()?;

        let cached = geo.cached_country(origin);
        if cached.is_none() && tokio::runtime::Handle::try_current().is_ok() {
            drop(geo.spawn_country_of(origin.clone()));
        }
        cached
    }
}

fn render_message(template: &str, origin: &Origin, count: usize, max: usize) -> String {
    template
        .replace("{origin}", origin.as_str())
        .replace("{count}", &count.to_string())
        .replace("{max}", &max.to_string())
}
