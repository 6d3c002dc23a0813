//! Per-identity access history
//!
//! Keeps the N most recent login attempts per identity (allowed and denied)
//! as a pure FIFO ring: when full, the oldest entry is evicted. Reading an
//! entry never reorders anything.
//!
//! Stored in `access-history.toml` under `[attempts]`, one array per identity.

use crate::identity::{Identity, Origin};
use crate::persistence::file::{read_toml, write_toml, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Default ring size per identity.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Country label used when no code was available.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// What the gate decided for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOutcome {
    Allowed,
    Denied,
}

/// One recorded login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub timestamp: String,
    pub origin: Origin,
    pub display_name: String,
    pub outcome: AccessOutcome,
    pub country: String,
}

type Rings = HashMap<Identity, VecDeque<AccessEntry>>;

#[derive(Debug, Default, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    attempts: BTreeMap<String, toml::Value>,
}

#[derive(Serialize)]
struct HistoryFileOut {
    attempts: BTreeMap<String, Vec<AccessEntry>>,
}

/// Bounded, persisted ring of recent attempts per identity.
#[derive(Debug)]
pub struct AccessHistory {
    path: PathBuf,
    max_entries: usize,
    rings: Mutex<Rings>,
}

impl AccessHistory {
    /// Open the history file, trimming any ring longer than `max_entries`.
    pub fn open(path: impl AsRef<Path>, max_entries: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let rings = load_rings(&path, max_entries)?;

        Ok(Self {
            path,
            max_entries,
            rings: Mutex::new(rings),
        })
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append an attempt, evicting the oldest entry when the ring is full.
    pub fn record(
        &self,
        identity: Identity,
        origin: &Origin,
        display_name: &str,
        outcome: AccessOutcome,
        country: Option<String>,
    ) {
        if self.max_entries == 0 {
            return;
        }

        let entry = AccessEntry {
            timestamp: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            origin: origin.clone(),
            display_name: display_name.to_string(),
            outcome,
            country: country.unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()),
        };

        let mut rings = self.lock();
        let ring = rings.entry(identity).or_default();
        while ring.len() >= self.max_entries {
            ring.pop_front();
        }
        ring.push_back(entry);

        info!(
            identity = %identity,
            player = %display_name,
            origin = %origin,
            outcome = ?outcome,
            "access attempt logged"
        );
        self.persist(&rings);
    }

    /// Entries for `identity`, oldest first.
    pub fn entries_for(&self, identity: &Identity) -> Vec<AccessEntry> {
        self.lock()
            .get(identity)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget every entry for `identity`. Returns whether anything was removed.
    pub fn clear(&self, identity: &Identity) -> bool {
        let mut rings = self.lock();
        if rings.remove(identity).is_none() {
            return false;
        }
        self.persist(&rings);
        true
    }

    /// Re-read the history file, replacing in-memory rings. Returns the
    /// number of identities with entries. On error nothing changes.
    pub fn reload(&self) -> Result<usize, StoreError> {
        let loaded = load_rings(&self.path, self.max_entries)?;
        let count = loaded.len();
        *self.lock() = loaded;
        Ok(count)
    }

    fn persist(&self, rings: &Rings) {
        let out = HistoryFileOut {
            attempts: rings
                .iter()
                .map(|(id, ring)| (id.to_string(), ring.iter().cloned().collect()))
                .collect(),
        };

        match write_toml(&self.path, &out) {
            Ok(()) => debug!("access history saved"),
            Err(e) => error!(error = %e, "error saving access log"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Rings> {
        self.rings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_rings(path: &Path, max_entries: usize) -> Result<Rings, StoreError> {
    let file: HistoryFile = read_toml(path)?;
    let mut rings = Rings::new();

    for (key, value) in file.attempts {
        let Ok(identity) = Identity::parse(&key) else {
            warn!(key = %key, "invalid identity in access history ignored");
            continue;
        };
        let entries: Vec<AccessEntry> = match value.try_into() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(identity = %identity, error = %e, "malformed access history ignored");
                continue;
            }
        };

        let skip = entries.len().saturating_sub(max_entries);
        let ring: VecDeque<AccessEntry> = entries.into_iter().skip(skip).collect();
        if !ring.is_empty() {
            rings.insert(identity, ring);
        }
    }

    Ok(rings)
}

/// Format one identity's history for operator display.
pub fn format_history(identity: &Identity, entries: &[AccessEntry]) -> String {
    if entries.is_empty() {
        return format!("No access history for {identity}.");
    }

    let mut output = format!("Access history for {identity}\n");
    for entry in entries {
        let outcome = match entry.outcome {
            AccessOutcome::Allowed => "allowed",
            AccessOutcome::Denied => "denied",
        };
        output.push_str(&format!(
            "\n[{}] IP: {} | Player: {} | Country: {} | {}",
            entry.timestamp, entry.origin, entry.display_name, entry.country, outcome
        ));
    }
    output
}
