//! Denial Audit Trail
//!
//! Append-only record of rejected login attempts.
//!
//! Design principles:
//! - Immutable append-only log (no deletion, no rewrite of past entries)
//! - Chronological ordering via the record key: a fixed-width RFC 3339
//!   microsecond timestamp plus a 10-digit collision suffix, so the
//!   lexicographic key order IS creation order
//! - Storage is unbounded; queries are bounded by an explicit limit
//! - Persisted synchronously to `failed-logins.toml` on every append

use crate::identity::{Identity, Origin};
use crate::persistence::file::{read_toml, write_toml, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Default number of entries returned by `recent` queries.
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Single denial record.
///
/// Field names on disk follow the `failed-logins` layout
/// (`player`, `uuid`, `attempted-ip`, `reason`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialRecord {
    /// Display name supplied with the login attempt.
    #[serde(rename = "player")]
    pub display_name: String,
    #[serde(rename = "uuid")]
    pub identity: Identity,
    #[serde(rename = "attempted-ip")]
    pub attempted_origin: Origin,
    pub reason: String,
    /// RFC 3339 timestamp, second precision.
    pub timestamp: String,
    /// Country code, when one was already cached at denial time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Query options for the denial trail.
#[derive(Debug, Clone)]
pub struct DenialQuery {
    /// Filter by identity.
    pub identity: Option<Identity>,
    /// Maximum number of results (most recent first).
    pub limit: usize,
}

impl Default for DenialQuery {
    fn default() -> Self {
        Self {
            identity: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FailedLoginsFile {
    #[serde(rename = "failed-logins", default)]
    entries: BTreeMap<String, toml::Value>,
}

#[derive(Serialize)]
struct FailedLoginsFileRef<'a> {
    #[serde(rename = "failed-logins")]
    entries: &'a BTreeMap<String, DenialRecord>,
}

/// Append-only denial log backed by a TOML file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, DenialRecord>>,
}

impl AuditLog {
    /// Open the trail at `path`, loading existing records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = load_entries(&path)?;

        if !path.exists() {
            write_toml(&path, &FailedLoginsFileRef { entries: &entries })?;
            info!(path = %path.display(), "created failed logins file");
        }

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one denial record and persist it.
    ///
    /// A write failure is logged; the record stays in memory and is written
    /// with the next successful append.
    pub fn record(
        &self,
        identity: Identity,
        display_name: &str,
        attempted_origin: &Origin,
        reason: &str,
        country: Option<String>,
    ) -> DenialRecord {
        let now = SystemTime::now();
        let record = DenialRecord {
            display_name: display_name.to_string(),
            identity,
            attempted_origin: attempted_origin.clone(),
            reason: reason.to_string(),
            timestamp: humantime::format_rfc3339_seconds(now).to_string(),
            country,
        };

        let mut entries = self.lock();
        let key = next_key(entries.keys().next_back().map(String::as_str), now);
        entries.insert(key.clone(), record.clone());

        match write_toml(&self.path, &FailedLoginsFileRef { entries: &entries }) {
            Ok(()) => debug!(key = %key, "failed login saved"),
            Err(e) => error!(error = %e, "error saving failed login"),
        }

        record
    }

    /// Most recent denials across all identities.
    pub fn recent(&self, limit: usize) -> Vec<DenialRecord> {
        self.query(&DenialQuery {
            identity: None,
            limit,
        })
    }

    /// Most recent denials for one identity.
    pub fn recent_for(&self, identity: &Identity, limit: usize) -> Vec<DenialRecord> {
        self.query(&DenialQuery {
            identity: Some(*identity),
            limit,
        })
    }

    /// Run a query. Results are most recent first.
    pub fn query(&self, query: &DenialQuery) -> Vec<DenialRecord> {
        self.lock()
            .values()
            .rev()
            .filter(|record| query.identity.is_none_or(|id| record.identity == id))
            .take(query.limit)
            .cloned()
            .collect()
    }

    /// Total number of records held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Re-read the trail from disk, replacing in-memory records.
    pub fn reload(&self) -> Result<usize, StoreError> {
        let loaded = load_entries(&self.path)?;
        let count = loaded.len();
        *self.lock() = loaded;
        Ok(count)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DenialRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Digits in the per-key sequence suffix; wide enough for any `u32`.
const SEQ_WIDTH: usize = 10;

/// Build a key strictly greater than `last`.
///
/// Normally `"<rfc3339 micros>-0000000000"`. If the clock has not moved past
/// the last key (same microsecond, or a backwards step) the last key's suffix
/// is bumped instead.
fn next_key(last: Option<&str>, now: SystemTime) -> String {
    let candidate = format!(
        "{}-{:0width$}",
        humantime::format_rfc3339_micros(now),
        0,
        width = SEQ_WIDTH
    );
    match last {
        Some(last) if last >= candidate.as_str() => bump_key(last),
        _ => candidate,
    }
}

/// Successor of `last` in lexical order.
///
/// A full-width suffix is incremented in place. A suffix that is missing,
/// shorter (older files) or exhausted gets a new zero segment appended,
/// which still sorts after `last`.
fn bump_key(last: &str) -> String {
    let bumped = last.rsplit_once('-').and_then(|(prefix, seq)| {
        if seq.len() != SEQ_WIDTH {
            return None;
        }
        let next = seq.parse::<u32>().ok()?.checked_add(1)?;
        Some(format!("{prefix}-{next:0width$}", width = SEQ_WIDTH))
    });

    bumped.unwrap_or_else(|| format!("{last}-{:0width$}", 0, width = SEQ_WIDTH))
}

fn load_entries(path: &Path) -> Result<BTreeMap<String, DenialRecord>, StoreError> {
    let file: FailedLoginsFile = read_toml(path)?;
    let mut entries = BTreeMap::new();

    for (key, value) in file.entries {
        match value.try_into::<DenialRecord>() {
            Ok(record) => {
                entries.insert(key, record);
            }
            Err(e) => warn!(key = %key, error = %e, "malformed failed login ignored"),
        }
    }

    Ok(entries)
}

/// Format denial records for operator display.
pub fn format_denials(records: &[DenialRecord]) -> String {
    if records.is_empty() {
        return "No failed login attempts recorded.".to_string();
    }

    let mut output = String::from("Failed login attempts\n\n");

    for record in records {
        output.push_str(&format!(
            "- {} {} ({})\n  IP: {}{}\n  Reason: {}\n\n",
            record.timestamp,
            record.display_name,
            record.identity,
            record.attempted_origin,
            record
                .country
                .as_deref()
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default(),
            record.reason
        ));
    }

    output.trim_end().to_string()
}
