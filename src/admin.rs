//! Administrative boundary
//!
//! Operator-facing queries and mutations. This layer owns the checks the
//! registration store deliberately leaves out:
//!
//! - `add_origin` refuses once the identity holds `max_origins` origins
//! - `remove_origin` refuses to remove the sole remaining origin; emptying a
//!   record is only possible through `reset_all`
//!
//! Both checks are evaluated by the store under its write guard.
//! - every mutation on an unknown identity is a reported no-op

use crate::gatekeeper::{AccessEntry, AccessHistory, AuditLog, DenialRecord};
use crate::identity::{Identity, Origin};
use crate::persistence::{AddOutcome, RegistrationStore, RemoveOutcome, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Admin operation failures. None of them mutate state.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Player {0} not found in database")]
    UnknownIdentity(Identity),

    #[error("Player {identity} already has {max} IPs registered")]
    CapReached { identity: Identity, max: usize },

    #[error("IP {origin} is already registered for {identity}")]
    AlreadyRegistered { identity: Identity, origin: Origin },

    #[error("Cannot remove the only IP for {0}; reset the player instead")]
    SoleOrigin(Identity),

    #[error("IP {origin} not found for {identity}")]
    OriginNotFound { identity: Identity, origin: Origin },

    #[error("Access history is disabled")]
    HistoryDisabled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of one identity's registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityInfo {
    pub identity: Identity,
    pub origins: Vec<Origin>,
    pub max_origins: usize,
}

impl IdentityInfo {
    /// The first-ever registered origin.
    pub fn primary(&self) -> Option<&Origin> {
        self.origins.first()
    }
}

/// Result of a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub identities: usize,
    pub denials: usize,
    /// Identities with a non-empty access history.
    pub histories: usize,
}

/// Query and mutate operations exposed to operators.
pub struct AdminService {
    store: Arc<RegistrationStore>,
    audit: Arc<AuditLog>,
    history: Option<Arc<AccessHistory>>,
    max_origins: usize,
}

impl AdminService {
    pub fn new(store: Arc<RegistrationStore>, audit: Arc<AuditLog>, max_origins: usize) -> Self {
        Self {
            store,
            audit,
            history: None,
            max_origins,
        }
    }

    pub fn with_history(mut self, history: Arc<AccessHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn max_origins(&self) -> usize {
        self.max_origins
    }

    // ---- queries ----

    pub fn list_identities(&self) -> Vec<Identity> {
        self.store.identities()
    }

    pub fn origins_for(&self, identity: &Identity) -> Vec<Origin> {
        self.store.origins_for(identity)
    }

    pub fn count_of(&self, identity: &Identity) -> usize {
        self.store.count_of(identity)
    }

    pub fn info(&self, identity: &Identity) -> Result<IdentityInfo, AdminError> {
        let origins = self.store.origins_for(identity);
        if origins.is_empty() {
            return Err(AdminError::UnknownIdentity(*identity));
        }
        Ok(IdentityInfo {
            identity: *identity,
            origins,
            max_origins: self.max_origins,
        })
    }

    pub fn recent_denials(&self, limit: usize) -> Vec<DenialRecord> {
        self.audit.recent(limit)
    }

    pub fn recent_denials_for(&self, identity: &Identity, limit: usize) -> Vec<DenialRecord> {
        self.audit.recent_for(identity, limit)
    }

    pub fn access_history(&self, identity: &Identity) -> Result<Vec<AccessEntry>, AdminError> {
        let history = self.history.as_ref().ok_or(AdminError::HistoryDisabled)?;
        Ok(history.entries_for(identity))
    }

    // ---- mutations ----

    /// Approve an extra origin. Returns the new origin count.
    ///
    /// The cap and duplicate checks run inside the store's write guard, so
    /// concurrent approvals cannot exceed `max_origins`.
    pub fn add_origin(&self, identity: &Identity, origin: Origin) -> Result<usize, AdminError> {
        match self
            .store
            .add_origin_capped(identity, origin.clone(), self.max_origins)
        {
            AddOutcome::Added(count) => {
                info!(identity = %identity, origin = %origin, count, "IP added");
                Ok(count)
            }
            AddOutcome::UnknownIdentity => Err(AdminError::UnknownIdentity(*identity)),
            AddOutcome::CapReached => Err(AdminError::CapReached {
                identity: *identity,
                max: self.max_origins,
            }),
            AddOutcome::AlreadyPresent => Err(AdminError::AlreadyRegistered {
                identity: *identity,
                origin,
            }),
        }
    }

    /// Revoke one origin, never the last. Returns the remaining count.
    pub fn remove_origin(&self, identity: &Identity, origin: &Origin) -> Result<usize, AdminError> {
        match self.store.remove_origin_keep_last(identity, origin) {
            RemoveOutcome::Removed(remaining) => {
                info!(identity = %identity, origin = %origin, remaining, "IP removed");
                Ok(remaining)
            }
            RemoveOutcome::UnknownIdentity => Err(AdminError::UnknownIdentity(*identity)),
            RemoveOutcome::SoleOrigin => Err(AdminError::SoleOrigin(*identity)),
            RemoveOutcome::NotPresent => Err(AdminError::OriginNotFound {
                identity: *identity,
                origin: origin.clone(),
            }),
        }
    }

    /// Clear every origin of `identity`. The next login re-registers.
    pub fn reset_all(&self, identity: &Identity) -> Result<Vec<Origin>, AdminError> {
        let removed = self.store.remove_all(identity);
        if removed.is_empty() {
            return Err(AdminError::UnknownIdentity(*identity));
        }
        info!(identity = %identity, removed = removed.len(), "all IPs reset");
        Ok(removed)
    }

    /// Forget the access history of `identity`.
    pub fn clear_access_history(&self, identity: &Identity) -> Result<bool, AdminError> {
        let history = self.history.as_ref().ok_or(AdminError::HistoryDisabled)?;
        Ok(history.clear(identity))
    }

    /// Re-read durable state, replacing what is in memory.
    ///
    /// Registrations, then denials, then access history. Each file is
    /// swapped in only after it parsed. On the first failure the reload
    /// stops: files already reloaded keep their new contents and the rest
    /// keep their in-memory state.
    pub fn reload(&self) -> Result<ReloadSummary, AdminError> {
        let identities = self.store.reload()?;
        let denials = self.audit.reload()?;
        let histories = match &self.history {
            Some(history) => history.reload()?,
            None => 0,
        };
        info!(identities, denials, histories, "configuration and data reloaded");
        Ok(ReloadSummary {
            identities,
            denials,
            histories,
        })
    }
}

/// Render an `IdentityInfo` the way the operator CLI prints it.
pub fn format_info(info: &IdentityInfo) -> String {
    let mut output = format!(
        "UUID: {}\nRegistered IPs: {}/{}\n",
        info.identity,
        info.origins.len(),
        info.max_origins
    );
    for (i, origin) in info.origins.iter().enumerate() {
        let kind = if i == 0 { "[Primary]" } else { "[Secondary]" };
        output.push_str(&format!("\n{kind} {origin}"));
    }
    output
}
