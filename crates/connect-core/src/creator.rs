//! Creator Records and Storage
//!
//! A `CreatorRecord` tracks one creator's activation status against the
//! payment provider. Records are created by provisioning, mutated only by
//! reconciliation, and never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{ConnectError, Result};

/// Durable record for one creator, keyed by `creator_id` with a secondary
/// unique index on `provider_account_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatorRecord {
    /// Opaque caller-assigned identifier, immutable once created
    pub creator_id: String,

    /// Provider-assigned sub-account identifier, immutable, 1:1 with `creator_id`
    pub provider_account_id: String,

    /// Contact email supplied at provisioning
    pub email: String,

    /// Optional display name
    pub name: Option<String>,

    /// Set once the provider confirms submitted details
    pub onboarding_complete: bool,

    /// Provider's current payment-acceptance eligibility; can flip both ways
    pub charges_enabled: bool,

    /// Space identifiers already associated with this creator
    #[serde(default)]
    pub access_grants: Vec<String>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,
}

impl CreatorRecord {
    /// Create a freshly provisioned record (not yet onboarded)
    pub fn new(
        creator_id: impl Into<String>,
        provider_account_id: impl Into<String>,
        email: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            creator_id: creator_id.into(),
            provider_account_id: provider_account_id.into(),
            email: email.into(),
            name,
            onboarding_complete: false,
            charges_enabled: false,
            access_grants: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite both activation flags from a single provider snapshot.
    ///
    /// Last writer wins; the two fields are never interleaved from
    /// different snapshots.
    pub fn apply_snapshot(&mut self, details_submitted: bool, charges_enabled: bool) {
        self.onboarding_complete = details_submitted;
        self.charges_enabled = charges_enabled;
        self.updated_at = Utc::now();
    }

    /// Associate a space identifier. Duplicates collapse; returns whether
    /// the grant was newly added.
    pub fn add_grant(&mut self, space_id: impl Into<String>) -> bool {
        let space_id = space_id.into();
        if self.access_grants.iter().any(|g| g == &space_id) {
            return false;
        }
        self.access_grants.push(space_id);
        self.updated_at = Utc::now();
        true
    }
}

/// Creator storage trait: a key-value store with two independent unique
/// exact-match indexes.
pub trait CreatorStore: Send + Sync {
    /// Insert a new record; fails with `Conflict` when either key is taken
    fn insert(&self, record: &CreatorRecord) -> Result<()>;

    /// Get a record by creator id
    fn get(&self, creator_id: &str) -> Result<Option<CreatorRecord>>;

    /// Get a record by provider account id
    fn get_by_account(&self, provider_account_id: &str) -> Result<Option<CreatorRecord>>;

    /// Overwrite an existing record; fails with `NotFound` for unknown ids
    fn update(&self, record: &CreatorRecord) -> Result<()>;

    /// All records, ordered by creator id
    fn list(&self) -> Result<Vec<CreatorRecord>>;
}

/// In-memory creator store (for development and tests)
///
/// Both indexes live behind one lock so concurrent writers and readers
/// never acquire them in different orders.
pub struct MemoryCreatorStore {
    inner: RwLock<MemState>,
}

struct MemState {
    creators: HashMap<String, CreatorRecord>,
    by_account: HashMap<String, String>,
}

impl Default for MemoryCreatorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCreatorStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemState {
                creators: HashMap::new(),
                by_account: HashMap::new(),
            }),
        }
    }
}

impl CreatorStore for MemoryCreatorStore {
    fn insert(&self, record: &CreatorRecord) -> Result<()> {
        let mut state = self.inner.write().unwrap();

        if state.creators.contains_key(&record.creator_id) {
            return Err(ConnectError::Conflict(format!(
                "creator {} already exists",
                record.creator_id
            )));
        }
        if state.by_account.contains_key(&record.provider_account_id) {
            return Err(ConnectError::Conflict(format!(
                "provider account {} already tracked",
                record.provider_account_id
            )));
        }

        state
            .by_account
            .insert(record.provider_account_id.clone(), record.creator_id.clone());
        state
            .creators
            .insert(record.creator_id.clone(), record.clone());

        Ok(())
    }

    fn get(&self, creator_id: &str) -> Result<Option<CreatorRecord>> {
        let state = self.inner.read().unwrap();
        Ok(state.creators.get(creator_id).cloned())
    }

    fn get_by_account(&self, provider_account_id: &str) -> Result<Option<CreatorRecord>> {
        let state = self.inner.read().unwrap();
        if let Some(creator_id) = state.by_account.get(provider_account_id) {
            Ok(state.creators.get(creator_id).cloned())
        } else {
            Ok(None)
        }
    }

    fn update(&self, record: &CreatorRecord) -> Result<()> {
        let mut state = self.inner.write().unwrap();

        if !state.creators.contains_key(&record.creator_id) {
            return Err(ConnectError::NotFound(format!(
                "creator {} not found",
                record.creator_id
            )));
        }

        state
            .creators
            .insert(record.creator_id.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<CreatorRecord>> {
        let state = self.inner.read().unwrap();
        let mut records: Vec<_> = state.creators.values().cloned().collect();
        records.sort_by(|a, b| a.creator_id.cmp(&b.creator_id));
        Ok(records)
    }
}

/// File-backed creator store: the full map is held in memory with both
/// indexes and persisted to a JSON file on every mutation
/// (write-temp-then-rename, so a crash never leaves a torn file).
pub struct JsonFileCreatorStore {
    path: PathBuf,
    inner: RwLock<FileState>,
}

struct FileState {
    creators: HashMap<String, CreatorRecord>,
    by_account: HashMap<String, String>,
}

impl JsonFileCreatorStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let creators: HashMap<String, CreatorRecord> = if path.exists() {
            let bytes = std::fs::read(&path)
                .map_err(|e| ConnectError::Storage(format!("read {}: {e}", path.display())))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| ConnectError::Storage(format!("parse {}: {e}", path.display())))?
        } else {
            HashMap::new()
        };

        let by_account = creators
            .values()
            .map(|r| (r.provider_account_id.clone(), r.creator_id.clone()))
            .collect();

        Ok(Self {
            path,
            inner: RwLock::new(FileState {
                creators,
                by_account,
            }),
        })
    }

    fn persist(&self, state: &FileState) -> Result<()> {
        let data = serde_json::to_vec_pretty(&state.creators)
            .map_err(|e| ConnectError::Storage(format!("serialize creators: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)
            .map_err(|e| ConnectError::Storage(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ConnectError::Storage(format!("rename {}: {e}", self.path.display())))?;

        Ok(())
    }
}

impl CreatorStore for JsonFileCreatorStore {
    fn insert(&self, record: &CreatorRecord) -> Result<()> {
        let mut state = self.inner.write().unwrap();

        if state.creators.contains_key(&record.creator_id) {
            return Err(ConnectError::Conflict(format!(
                "creator {} already exists",
                record.creator_id
            )));
        }
        if state.by_account.contains_key(&record.provider_account_id) {
            return Err(ConnectError::Conflict(format!(
                "provider account {} already tracked",
                record.provider_account_id
            )));
        }

        state
            .by_account
            .insert(record.provider_account_id.clone(), record.creator_id.clone());
        state
            .creators
            .insert(record.creator_id.clone(), record.clone());

        self.persist(&state)
    }

    fn get(&self, creator_id: &str) -> Result<Option<CreatorRecord>> {
        let state = self.inner.read().unwrap();
        Ok(state.creators.get(creator_id).cloned())
    }

    fn get_by_account(&self, provider_account_id: &str) -> Result<Option<CreatorRecord>> {
        let state = self.inner.read().unwrap();
        if let Some(creator_id) = state.by_account.get(provider_account_id) {
            Ok(state.creators.get(creator_id).cloned())
        } else {
            Ok(None)
        }
    }

    fn update(&self, record: &CreatorRecord) -> Result<()> {
        let mut state = self.inner.write().unwrap();

        if !state.creators.contains_key(&record.creator_id) {
            return Err(ConnectError::NotFound(format!(
                "creator {} not found",
                record.creator_id
            )));
        }

        state
            .creators
            .insert(record.creator_id.clone(), record.clone());
        self.persist(&state)
    }

    fn list(&self) -> Result<Vec<CreatorRecord>> {
        let state = self.inner.read().unwrap();
        let mut records: Vec<_> = state.creators.values().cloned().collect();
        records.sort_by(|a, b| a.creator_id.cmp(&b.creator_id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(creator_id: &str, account_id: &str) -> CreatorRecord {
        CreatorRecord::new(creator_id, account_id, "a@b.com", None)
    }

    #[test]
    fn snapshot_overwrites_both_flags() {
        let mut r = record("creator_1", "acct_1");
        r.apply_snapshot(true, true);
        assert!(r.onboarding_complete);
        assert!(r.charges_enabled);

        // charges_enabled may regress while onboarding_complete stays true
        r.apply_snapshot(true, false);
        assert!(r.onboarding_complete);
        assert!(!r.charges_enabled);
    }

    #[test]
    fn snapshot_is_idempotent_up_to_timestamp() {
        let mut a = record("creator_1", "acct_1");
        a.apply_snapshot(true, true);
        let mut b = a.clone();
        b.apply_snapshot(true, true);

        b.updated_at = a.updated_at;
        assert_eq!(a, b);
    }

    #[test]
    fn grants_collapse_duplicates() {
        let mut r = record("creator_1", "acct_1");
        assert!(r.add_grant("!space:example.org"));
        assert!(!r.add_grant("!space:example.org"));
        assert_eq!(r.access_grants.len(), 1);
    }

    #[test]
    fn insert_conflicts_on_either_key() {
        let store = MemoryCreatorStore::new();
        store.insert(&record("creator_1", "acct_1")).unwrap();

        let dup_creator = store.insert(&record("creator_1", "acct_2"));
        assert!(matches!(dup_creator, Err(ConnectError::Conflict(_))));

        let dup_account = store.insert(&record("creator_2", "acct_1"));
        assert!(matches!(dup_account, Err(ConnectError::Conflict(_))));
    }

    #[test]
    fn lookup_by_both_indexes() {
        let store = MemoryCreatorStore::new();
        store.insert(&record("creator_1", "acct_1")).unwrap();

        assert!(store.get("creator_1").unwrap().is_some());
        assert!(store.get_by_account("acct_1").unwrap().is_some());
        // Exact-match only
        assert!(store.get("creator").unwrap().is_none());
        assert!(store.get_by_account("acct").unwrap().is_none());
    }

    #[test]
    fn update_requires_existing_record() {
        let store = MemoryCreatorStore::new();
        let r = record("creator_1", "acct_1");
        assert!(matches!(store.update(&r), Err(ConnectError::NotFound(_))));

        store.insert(&r).unwrap();
        let mut r = r;
        r.apply_snapshot(true, true);
        store.update(&r).unwrap();
        assert!(store.get("creator_1").unwrap().unwrap().charges_enabled);
    }

    #[test]
    fn concurrent_inserts_and_account_lookups_make_progress() {
        use std::sync::Arc;

        let store = Arc::new(MemoryCreatorStore::new());
        store.insert(&record("creator_0", "acct_0")).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..500 {
                    store
                        .insert(&record(&format!("creator_{i}"), &format!("acct_{i}")))
                        .unwrap();
                }
            })
        };
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    assert!(store.get_by_account("acct_0").unwrap().is_some());
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.list().unwrap().len(), 500);
    }

    #[test]
    fn file_store_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creators.json");

        {
            let store = JsonFileCreatorStore::open(&path).unwrap();
            store.insert(&record("creator_1", "acct_1")).unwrap();
            let mut r = store.get("creator_1").unwrap().unwrap();
            r.apply_snapshot(true, true);
            store.update(&r).unwrap();
        }

        let reopened = JsonFileCreatorStore::open(&path).unwrap();
        let r = reopened.get_by_account("acct_1").unwrap().unwrap();
        assert_eq!(r.creator_id, "creator_1");
        assert!(r.charges_enabled);

        let dup = reopened.insert(&record("creator_2", "acct_1"));
        assert!(matches!(dup, Err(ConnectError::Conflict(_))));
    }
}
