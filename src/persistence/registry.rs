//! Registration Store - identity → approved origins
//!
//! Single source of truth for allow decisions.
//!
//! ## Invariants
//!
//! - An identity present in the map has at least one origin
//! - The first origin is the primary one and is never implicitly replaced
//! - No origin appears twice for the same identity
//!
//! The per-identity cap is NOT enforced here; the admin boundary checks it
//! before calling `add_origin`.
//!
//! ## Concurrency
//!
//! One `RwLock` guards the whole map. Mutations hold the write guard across
//! the durable write, so updates are linearizable and the file always
//! reflects a prefix of the mutation order. A failed write is logged and the
//! in-memory state stays authoritative until the next successful write.

use super::file::{read_toml, write_toml, StoreError};
use crate::identity::{Identity, Origin};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// On-disk shape of `player-origins.toml`.
///
/// Origins are kept as raw strings so that one bad entry can be skipped
/// without failing the whole document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistrationFile {
    #[serde(default)]
    identities: BTreeMap<String, Vec<String>>,
}

type OriginMap = HashMap<Identity, Vec<Origin>>;

/// Result of `RegistrationStore::add_origin_capped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Added; carries the new origin count.
    Added(usize),
    UnknownIdentity,
    CapReached,
    AlreadyPresent,
}

/// Result of `RegistrationStore::remove_origin_keep_last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Removed; carries the remaining origin count.
    Removed(usize),
    UnknownIdentity,
    SoleOrigin,
    NotPresent,
}

/// Concurrent identity → ordered origins mapping, persisted on every mutation.
#[derive(Debug)]
pub struct RegistrationStore {
    path: PathBuf,
    identities: RwLock<OriginMap>,
}

impl RegistrationStore {
    /// Open the store backed by `path`, loading any existing records.
    ///
    /// A missing file is created empty. Malformed records are skipped with a
    /// warning; only an unreadable or unparseable file is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let identities = load_records(&path)?;

        if !path.exists() {
            write_toml(&path, &RegistrationFile::default())?;
            info!(path = %path.display(), "created registration file");
        }

        info!(identities = identities.len(), "loaded identities with their origins");

        Ok(Self {
            path,
            identities: RwLock::new(identities),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Membership test, no side effects.
    pub fn has_identity(&self, identity: &Identity) -> bool {
        self.read().contains_key(identity)
    }

    /// Copy of the origins registered for `identity` (empty if unknown).
    pub fn origins_for(&self, identity: &Identity) -> Vec<Origin> {
        self.read().get(identity).cloned().unwrap_or_default()
    }

    /// Number of registered origins (0 if unknown).
    pub fn count_of(&self, identity: &Identity) -> usize {
        self.read().get(identity).map_or(0, Vec::len)
    }

    /// True iff `identity` is known and `origin` is one of its origins.
    pub fn is_allowed(&self, identity: &Identity, origin: &Origin) -> bool {
        self.read()
            .get(identity)
            .is_some_and(|origins| origins.contains(origin))
    }

    /// All known identities, sorted for stable listing.
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of known identities.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Establish the primary origin for a previously unknown identity.
    ///
    /// Returns `false` (no-op) if the identity already has a record.
    pub fn register_primary(&self, identity: Identity, origin: Origin) -> bool {
        let mut map = self.write();
        if map.contains_key(&identity) {
            return false;
        }

        debug!(identity = %identity, origin = %origin, "primary origin registered");
        map.insert(identity, vec![origin]);
        self.persist(&map);
        true
    }

    /// Append `origin` to a known identity.
    ///
    /// Returns `false` if the identity is unknown or the origin is already
    /// present.
    pub fn add_origin(&self, identity: &Identity, origin: Origin) -> bool {
        matches!(
            self.add_origin_capped(identity, origin, usize::MAX),
            AddOutcome::Added(_)
        )
    }

    /// Append `origin` unless the identity already holds `max` origins.
    ///
    /// Every check runs under the write guard, so concurrent callers can
    /// never push a record past `max`.
    pub fn add_origin_capped(&self, identity: &Identity, origin: Origin, max: usize) -> AddOutcome {
        let mut map = self.write();
        let Some(origins) = map.get_mut(identity) else {
            return AddOutcome::UnknownIdentity;
        };
        if origins.len() >= max {
            return AddOutcome::CapReached;
        }
        if origins.contains(&origin) {
            return AddOutcome::AlreadyPresent;
        }

        info!(identity = %identity, origin = %origin, "origin added");
        origins.push(origin);
        let count = origins.len();
        self.persist(&map);
        AddOutcome::Added(count)
    }

    /// Remove `origin` from a known identity.
    ///
    /// If this empties the sequence the identity is deleted entirely.
    /// `remove_origin_keep_last` is the bounded form used by operators.
    pub fn remove_origin(&self, identity: &Identity, origin: &Origin) -> bool {
        matches!(
            self.remove_inner(identity, origin, false),
            RemoveOutcome::Removed(_)
        )
    }

    /// Remove `origin` unless it is the identity's only origin.
    pub fn remove_origin_keep_last(&self, identity: &Identity, origin: &Origin) -> RemoveOutcome {
        self.remove_inner(identity, origin, true)
    }

    fn remove_inner(&self, identity: &Identity, origin: &Origin, keep_last: bool) -> RemoveOutcome {
        let mut map = self.write();
        let Some(origins) = map.get_mut(identity) else {
            return RemoveOutcome::UnknownIdentity;
        };
        if keep_last && origins.len() == 1 {
            return RemoveOutcome::SoleOrigin;
        }
        let Some(index) = origins.iter().position(|o| o == origin) else {
            return RemoveOutcome::NotPresent;
        };

        origins.remove(index);
        let remaining = origins.len();
        if remaining == 0 {
            map.remove(identity);
        }

        info!(identity = %identity, origin = %origin, "origin removed");
        self.persist(&map);
        RemoveOutcome::Removed(remaining)
    }

    /// Unconditionally delete the record for `identity`.
    ///
    /// Returns the origins that were removed (empty if the identity was
    /// unknown, in which case nothing is written).
    pub fn remove_all(&self, identity: &Identity) -> Vec<Origin> {
        let mut map = self.write();
        let Some(removed) = map.remove(identity) else {
            return Vec::new();
        };

        info!(identity = %identity, removed = removed.len(), "all origins removed");
        self.persist(&map);
        removed
    }

    /// Replace in-memory state with the contents of the durable file.
    ///
    /// Returns the number of identities loaded. On error the current state is
    /// left untouched.
    pub fn reload(&self) -> Result<usize, StoreError> {
        let loaded = load_records(&self.path)?;
        let count = loaded.len();
        *self.write() = loaded;
        info!(identities = count, "registration store reloaded");
        Ok(count)
    }

    /// Write the current state to disk, surfacing any error to the caller.
    pub fn flush(&self) -> Result<(), StoreError> {
        let map = self.write();
        write_toml(&self.path, &to_file(&map))
    }

    fn persist(&self, map: &OriginMap) {
        match write_toml(&self.path, &to_file(map)) {
            Ok(()) => debug!(identities = map.len(), "registrations saved"),
            Err(e) => error!(error = %e, "failed to save registrations"),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, OriginMap> {
        self.identities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, OriginMap> {
        self.identities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_file(map: &OriginMap) -> RegistrationFile {
    RegistrationFile {
        identities: map
            .iter()
            .map(|(id, origins)| {
                (
                    id.to_string(),
                    origins.iter().map(|o| o.as_str().to_string()).collect(),
                )
            })
            .collect(),
    }
}

fn load_records(path: &Path) -> Result<OriginMap, StoreError> {
    let file: RegistrationFile = read_toml(path)?;
    let mut map = OriginMap::with_capacity(file.identities.len());

    for (key, raw_origins) in file.identities {
        let identity = match Identity::parse(&key) {
            Ok(identity) => identity,
            Err(_) => {
                warn!(key = %key, "invalid identity ignored");
                continue;
            }
        };

        let mut origins: Vec<Origin> = Vec::with_capacity(raw_origins.len());
        for raw in raw_origins {
            match Origin::parse(&raw) {
                Ok(origin) if !origins.contains(&origin) => origins.push(origin),
                Ok(_) => warn!(identity = %identity, origin = %raw, "duplicate origin ignored"),
                Err(_) => warn!(identity = %identity, origin = %raw, "invalid origin ignored"),
            }
        }

        if origins.is_empty() {
            warn!(identity = %identity, "identity without origins ignored");
            continue;
        }
        map.insert(identity, origins);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn origin(s: &str) -> Origin {
        Origin::parse(s).unwrap()
    }

    fn open_store(temp_dir: &TempDir) -> RegistrationStore {
        RegistrationStore::open(temp_dir.path().join("player-origins.toml")).unwrap()
    }

    #[test]
    fn test_open_creates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        assert!(store.path().exists());
        assert!(store.is_empty());
    }

    #[test]
    fn test_register_primary_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();

        assert!(store.register_primary(id, origin("1.2.3.4")));
        assert!(!store.register_primary(id, origin("5.6.7.8")));
        assert_eq!(store.origins_for(&id), vec![origin("1.2.3.4")]);
    }

    #[test]
    fn test_unknown_identity_queries() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();

        assert!(!store.has_identity(&id));
        assert!(store.origins_for(&id).is_empty());
        assert_eq!(store.count_of(&id), 0);
        assert!(!store.is_allowed(&id, &origin("1.2.3.4")));
        assert!(!store.add_origin(&id, origin("1.2.3.4")));
        assert!(!store.remove_origin(&id, &origin("1.2.3.4")));
        assert!(store.remove_all(&id).is_empty());
    }

    #[test]
    fn test_add_origin_rejects_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();
        store.register_primary(id, origin("1.2.3.4"));

        assert!(store.add_origin(&id, origin("5.6.7.8")));
        assert!(!store.add_origin(&id, origin("5.6.7.8")));
        assert_eq!(
            store.origins_for(&id),
            vec![origin("1.2.3.4"), origin("5.6.7.8")]
        );
    }

    #[test]
    fn test_remove_then_add_restores_membership() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();
        store.register_primary(id, origin("1.2.3.4"));
        store.add_origin(&id, origin("5.6.7.8"));

        assert!(store.remove_origin(&id, &origin("5.6.7.8")));
        assert!(!store.is_allowed(&id, &origin("5.6.7.8")));
        assert!(store.add_origin(&id, origin("5.6.7.8")));
        assert!(store.is_allowed(&id, &origin("5.6.7.8")));
    }

    #[test]
    fn test_removing_last_origin_deletes_identity() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();
        store.register_primary(id, origin("1.2.3.4"));

        assert!(store.remove_origin(&id, &origin("1.2.3.4")));
        assert!(!store.has_identity(&id));
        assert!(store.origins_for(&id).is_empty());
    }

    #[test]
    fn test_remove_all_returns_removed() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();
        store.register_primary(id, origin("1.2.3.4"));
        store.add_origin(&id, origin("5.6.7.8"));

        let removed = store.remove_all(&id);
        assert_eq!(removed, vec![origin("1.2.3.4"), origin("5.6.7.8")]);
        assert!(!store.has_identity(&id));
    }

    #[test]
    fn test_mutations_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let id = Identity::random();
        {
            let store = open_store(&temp_dir);
            store.register_primary(id, origin("1.2.3.4"));
            store.add_origin(&id, origin("2001:db8::1"));
        }

        let reopened = open_store(&temp_dir);
        assert_eq!(
            reopened.origins_for(&id),
            vec![origin("1.2.3.4"), origin("2001:db8::1")]
        );
    }

    #[test]
    fn test_load_skips_malformed_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("player-origins.toml");
        let good = Identity::random();
        fs::write(
            &path,
            format!(
                r#"
[identities]
"not-a-uuid" = ["1.2.3.4"]
"{good}" = ["1.2.3.4", "garbage", "1.2.3.4", "5.6.7.8"]
"{empty}" = []
"#,
                empty = Identity::random()
            ),
        )
        .unwrap();

        let store = RegistrationStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.origins_for(&good),
            vec![origin("1.2.3.4"), origin("5.6.7.8")]
        );
    }

    #[test]
    fn test_reload_replaces_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let stale = Identity::random();
        store.register_primary(stale, origin("1.2.3.4"));

        let fresh = Identity::random();
        fs::write(
            store.path(),
            format!("[identities]\n\"{fresh}\" = [\"9.9.9.9\"]\n"),
        )
        .unwrap();

        assert_eq!(store.reload().unwrap(), 1);
        assert!(!store.has_identity(&stale));
        assert!(store.is_allowed(&fresh, &origin("9.9.9.9")));
    }

    #[test]
    fn test_reload_error_keeps_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();
        store.register_primary(id, origin("1.2.3.4"));

        fs::write(store.path(), "identities = [[[").unwrap();
        assert!(store.reload().is_err());
        assert!(store.has_identity(&id));
    }

    #[test]
    fn test_persistence_failure_keeps_memory() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();

        // Replace the data file's directory entry with a directory so the
        // rename fails.
        fs::remove_file(store.path()).unwrap();
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("occupied"), "x").unwrap();

        assert!(store.register_primary(id, origin("1.2.3.4")));
        assert!(store.is_allowed(&id, &origin("1.2.3.4")));
        assert!(store.flush().is_err());
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&temp_dir));
        let id = Identity::random();
        store.register_primary(id, origin("10.0.0.1"));

        let handles: Vec<_> = (2..=20u8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.add_origin(&id, origin(&format!("10.0.0.{i}")))
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(store.count_of(&id), 20);

        let reopened = open_store(&temp_dir);
        assert_eq!(reopened.count_of(&id), 20);
    }

    #[test]
    fn test_capped_adds_race_to_exactly_the_cap() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&temp_dir));
        let id = Identity::random();
        store.register_primary(id, origin("10.0.0.1"));

        let barrier = Arc::new(std::sync::Barrier::new(16));
        let handles: Vec<_> = (2..=17u8)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.add_origin_capped(&id, origin(&format!("10.0.0.{i}")), 2)
                })
            })
            .collect();

        let added = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| matches!(outcome, AddOutcome::Added(_)))
            .count();

        assert_eq!(added, 1);
        assert_eq!(store.count_of(&id), 2);
    }

    #[test]
    fn test_concurrent_bounded_removes_keep_one_origin() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&temp_dir));
        let id = Identity::random();
        store.register_primary(id, origin("10.0.0.1"));
        store.add_origin(&id, origin("10.0.0.2"));

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let handles: Vec<_> = ["10.0.0.1", "10.0.0.2"]
            .into_iter()
            .map(|ip| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.remove_origin_keep_last(&id, &origin(ip))
                })
            })
            .collect();

        let outcomes: Vec<RemoveOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(outcomes.contains(&RemoveOutcome::Removed(1)));
        assert!(outcomes.contains(&RemoveOutcome::SoleOrigin));
        assert_eq!(store.count_of(&id), 1);
    }

    #[test]
    fn test_keep_last_outcomes() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let id = Identity::random();

        assert_eq!(
            store.remove_origin_keep_last(&id, &origin("1.2.3.4")),
            RemoveOutcome::UnknownIdentity
        );
        store.register_primary(id, origin("1.2.3.4"));
        store.add_origin(&id, origin("5.6.7.8"));
        assert_eq!(
            store.remove_origin_keep_last(&id, &origin("9.9.9.9")),
            RemoveOutcome::NotPresent
        );
        assert_eq!(
            store.add_origin_capped(&id, origin("9.9.9.9"), 2),
            AddOutcome::CapReached
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6).prop_map(Op::Add),
            (0u8..6).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_record_is_never_empty_or_duplicated(ops in prop::collection::vec(op_strategy(), 1..30)) {
            let temp_dir = TempDir::new().unwrap();
            let store = open_store(&temp_dir);
            let id = Identity::random();
            store.register_primary(id, origin("10.0.0.0"));

            for op in ops {
                match op {
                    Op::Add(n) => { store.add_origin(&id, origin(&format!("10.0.0.{n}"))); }
                    Op::Remove(n) => { store.remove_origin(&id, &origin(&format!("10.0.0.{n}"))); }
                }

                let origins = store.origins_for(&id);
                prop_assert_eq!(store.has_identity(&id), !origins.is_empty());
                let mut deduped = origins.clone();
                deduped.sort();
                deduped.dedup();
                prop_assert_eq!(deduped.len(), origins.len());
            }
        }
    }
}
