//! In-memory store.
//!
//! Implements the same contract as [`SqliteStore`](super::SqliteStore),
//! including the second `AutoDenied` row on duplicates, so services can be
//! exercised without a database file.

use super::acquire_lock;
use super::traits::{ContentStore, CredentialStateStore, IdentityStore};
use crate::models::{
    ContentRecord, Credential, Fingerprint, Identity, IdentityKey, NewContentRecord,
    PersistedCredential, RecordQuery, RecordStatus,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    records: Vec<ContentRecord>,
    fingerprints: HashSet<Fingerprint>,
    identities: BTreeMap<IdentityKey, Identity>,
}

/// Mutex-guarded store kept entirely in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency` before touching state.
    ///
    /// Used to widen race windows and to drive deadline tests.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of record rows, duplicates included.
    #[must_use]
    pub fn record_count(&self) -> usize {
        acquire_lock(&self.state).records.len()
    }

    /// Snapshot of every record row in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<ContentRecord> {
        acquire_lock(&self.state).records.clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn insert_if_fingerprint_absent(&self, record: &NewContentRecord) -> Result<bool> {
        self.pause().await;
        let mut state = acquire_lock(&self.state);
        let existed = !state.fingerprints.insert(record.fingerprint.clone());
        let status = if existed {
            RecordStatus::AutoDenied
        } else {
            record.status
        };
        let id = i64::try_from(state.records.len())
            .map_err(|e| Error::operation("insert_record", e))?
            + 1;
        state.records.push(ContentRecord {
            id,
            fingerprint: record.fingerprint.clone(),
            owner: record.owner.clone(),
            locator: record.locator.clone(),
            status,
            created_at: record.created_at,
        });
        Ok(existed)
    }

    async fn fingerprints_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Fingerprint>> {
        self.pause().await;
        let state = acquire_lock(&self.state);
        let mut seen = HashSet::new();
        Ok(state
            .records
            .iter()
            .filter(|r| r.created_at >= from && r.created_at <= to)
            .filter(|r| seen.insert(r.fingerprint.clone()))
            .map(|r| r.fingerprint.clone())
            .collect())
    }

    async fn records_by_owner(
        &self,
        owner: &IdentityKey,
        query: &RecordQuery,
    ) -> Result<Vec<ContentRecord>> {
        self.pause().await;
        let state = acquire_lock(&self.state);
        Ok(state
            .records
            .iter()
            .filter(|r| &r.owner == owner && query.matches(r.created_at, r.status))
            .cloned()
            .collect())
    }

    async fn records_by_supervisor(
        &self,
        supervisor: &IdentityKey,
        query: &RecordQuery,
    ) -> Result<Vec<ContentRecord>> {
        self.pause().await;
        let state = acquire_lock(&self.state);
        let team: HashSet<&IdentityKey> = state
            .identities
            .values()
            .filter(|i| i.supervisor.as_ref() == Some(supervisor))
            .map(|i| &i.key)
            .collect();
        Ok(state
            .records
            .iter()
            .filter(|r| team.contains(&r.owner) && query.matches(r.created_at, r.status))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn all_active_identities(&self) -> Result<Vec<Identity>> {
        self.pause().await;
        let state = acquire_lock(&self.state);
        Ok(state.identities.values().filter(|i| i.active).cloned().collect())
    }

    async fn identity(&self, key: &IdentityKey) -> Result<Option<Identity>> {
        self.pause().await;
        Ok(acquire_lock(&self.state).identities.get(key).cloned())
    }

    async fn create_identity(&self, identity: &Identity) -> Result<()> {
        self.pause().await;
        let mut state = acquire_lock(&self.state);
        if state.identities.contains_key(&identity.key) {
            return Err(Error::AlreadyExists(identity.key.to_string()));
        }
        state
            .identities
            .insert(identity.key.clone(), identity.clone());
        Ok(())
    }
}

/// Credential mirror kept in memory; nothing survives the process.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    saved: Mutex<Option<PersistedCredential>>,
    fail_saves: bool,
}

impl InMemoryCredentialStore {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mirror already holding `credential`.
    #[must_use]
    pub fn with_credential(credential: &Credential) -> Self {
        Self {
            saved: Mutex::new(Some(PersistedCredential::from(credential))),
            fail_saves: false,
        }
    }

    /// Makes every `save` fail.
    #[must_use]
    pub const fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// Returns `true` if a credential has been saved.
    #[must_use]
    pub fn has_saved(&self) -> bool {
        acquire_lock(&self.saved).is_some()
    }
}

#[async_trait]
impl CredentialStateStore for InMemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(acquire_lock(&self.saved).clone().map(Credential::from))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if self.fail_saves {
            return Err(Error::operation("save_credential", "read-only file system"));
        }
        *acquire_lock(&self.saved) = Some(PersistedCredential::from(credential));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn record(fp: &str, owner: &str) -> NewContentRecord {
        NewContentRecord::pending(
            Fingerprint::parse(fp).unwrap(),
            IdentityKey::new(owner).unwrap(),
            "http://x/1",
        )
    }

    #[tokio::test]
    async fn test_duplicate_writes_auto_denied_row() {
        let store = InMemoryStore::new();
        assert!(!store.insert_if_fingerprint_absent(&record("a", "u")).await.unwrap());
        assert!(store.insert_if_fingerprint_absent(&record("a", "v")).await.unwrap());

        let rows = store.records();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, RecordStatus::PendingConfirmation);
        assert_eq!(rows[1].status, RecordStatus::AutoDenied);
        assert_eq!(rows[1].id, 2);
    }

    #[tokio::test]
    async fn test_window_deduplicates_fingerprints() {
        let store = InMemoryStore::new();
        store.insert_if_fingerprint_absent(&record("a", "u")).await.unwrap();
        store.insert_if_fingerprint_absent(&record("a", "u")).await.unwrap();
        store.insert_if_fingerprint_absent(&record("b", "u")).await.unwrap();

        let now = Utc::now();
        let fps = store
            .fingerprints_in_window(now - chrono::Duration::hours(1), now + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(fps.len(), 2);
    }

    #[tokio::test]
    async fn test_create_identity_conflict() {
        let store = InMemoryStore::new();
        let identity = Identity::new(IdentityKey::new("u").unwrap(), "U");
        store.create_identity(&identity).await.unwrap();
        assert!(matches!(
            store.create_identity(&identity).await,
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(store.all_active_identities().await.unwrap().len(), 1);
        assert_eq!(store.identity(&identity.key).await.unwrap().unwrap().display_name, "U");
    }
}
