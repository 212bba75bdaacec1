//! Identity registry.
//!
//! Read-through cache over the identity store with per-key creation markers.
//!
//! # Concurrency Model
//!
//! | State | Guard | Held across store call |
//! |-------|-------|------------------------|
//! | cache | `DashMap` shards | no |
//! | in-flight markers | one `Mutex<HashSet>` | no |
//!
//! A creation takes the marker lock only to check the cache and insert its
//! key, then releases it before calling the store. Different keys create in
//! parallel; a second creation of the same key fails fast with
//! [`Error::CreationInProgress`] instead of queueing.
//!
//! A store write can commit after its caller gave up (the `SQLite` backend
//! runs on the blocking pool). The next creation of that key then gets
//! [`Error::AlreadyExists`] from the store and adopts the persisted row into
//! the cache, so the key becomes usable instead of being stuck.

use crate::models::{Identity, IdentityKey};
use crate::storage::{IdentityStore, acquire_lock};
use crate::{Error, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Read-through identity cache.
///
/// # Example
///
/// ```rust,ignore
/// let registry = IdentityRegistry::load(store).await?;
/// registry.create(Identity::new(IdentityKey::new("user_1")?, "Alex")).await?;
/// assert!(registry.lookup("user_1").is_some());
/// ```
pub struct IdentityRegistry {
    store: Arc<dyn IdentityStore>,
    cache: DashMap<IdentityKey, Identity>,
    creating: Mutex<HashSet<IdentityKey>>,
}

/// Clears a creation marker when dropped, including when the creating
/// future is dropped mid-store-call.
struct CreationMarker<'a> {
    creating: &'a Mutex<HashSet<IdentityKey>>,
    key: IdentityKey,
}

impl Drop for CreationMarker<'_> {
    fn drop(&mut self) {
        acquire_lock(self.creating).remove(&self.key);
    }
}

impl IdentityRegistry {
    /// Seeds the cache with every active identity.
    ///
    /// # Errors
    ///
    /// Returns the store's error; a registry is never built un-seeded.
    #[instrument(skip(store))]
    pub async fn load(store: Arc<dyn IdentityStore>) -> Result<Self> {
        let identities = store.all_active_identities().await?;
        let cache = DashMap::with_capacity(identities.len());
        for identity in identities {
            cache.insert(identity.key.clone(), identity);
        }
        tracing::info!(count = cache.len(), "identity registry loaded");
        record_size(cache.len());

        Ok(Self {
            store,
            cache,
            creating: Mutex::new(HashSet::new()),
        })
    }

    /// Looks up a cached identity. Never touches the store.
    ///
    /// Keys still being created are not found.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Identity> {
        self.cache.get(key).map(|entry| entry.value().clone())
    }

    /// Number of cached identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if no identity is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Returns `true` while a creation for `key` is in flight.
    #[must_use]
    pub fn is_creating(&self, key: &str) -> bool {
        acquire_lock(&self.creating).contains(key)
    }

    /// Persists and caches a new identity.
    ///
    /// On success the identity is cached before the marker is cleared, so a
    /// [`lookup`](Self::lookup) after this returns finds it. On a store
    /// failure nothing is cached. When the store already holds the key, the
    /// persisted identity is cached if active and `AlreadyExists` is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] if the key is cached or already persisted
    /// - [`Error::CreationInProgress`] if another creation for the key is running
    /// - the store's error if persistence fails
    #[instrument(skip(self, identity), fields(key = %identity.key))]
    pub async fn create(&self, identity: Identity) -> Result<()> {
        let _marker = match self.claim(&identity.key) {
            Ok(marker) => marker,
            Err(e) => {
                record_creation(&e);
                return Err(e);
            },
        };

        match self.store.create_identity(&identity).await {
            Ok(()) => {},
            Err(e @ Error::AlreadyExists(_)) => {
                self.adopt_persisted(&identity.key).await;
                record_creation(&e);
                return Err(e);
            },
            Err(e) => {
                tracing::warn!(error = %e, "identity creation failed");
                record_creation(&e);
                return Err(e);
            },
        }

        self.cache.insert(identity.key.clone(), identity);
        metrics::counter!("registry_creations_total", "result" => "created").increment(1);
        record_size(self.cache.len());
        tracing::info!("identity created");
        Ok(())
    }

    /// Caches an active identity the store already holds but this cache
    /// never saw, such as one committed by a cancelled creation.
    async fn adopt_persisted(&self, key: &IdentityKey) {
        match self.store.identity(key).await {
            Ok(Some(persisted)) if persisted.active => {
                self.cache.insert(key.clone(), persisted);
                record_size(self.cache.len());
                tracing::info!("adopted identity persisted outside this registry");
            },
            Ok(_) => {},
            Err(e) => tracing::warn!(error = %e, "could not read back persisted identity"),
        }
    }

    fn claim(&self, key: &IdentityKey) -> Result<CreationMarker<'_>> {
        let mut creating = acquire_lock(&self.creating);
        if self.cache.contains_key(key) {
            return Err(Error::AlreadyExists(key.to_string()));
        }
        if !creating.insert(key.clone()) {
            return Err(Error::CreationInProgress(key.to_string()));
        }
        Ok(CreationMarker {
            creating: &self.creating,
            key: key.clone(),
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_size(len: usize) {
    metrics::gauge!("registry_size").set(len as f64);
}

fn record_creation(error: &Error) {
    let result = match error {
        Error::AlreadyExists(_) => "already_exists",
        Error::CreationInProgress(_) => "in_progress",
        _ => "failed",
    };
    metrics::counter!("registry_creations_total", "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn identity(key: &str) -> Identity {
        Identity::new(IdentityKey::new(key).unwrap(), key.to_uppercase())
    }

    /// Store whose `create_identity` parks until released, then fails or succeeds.
    struct GatedStore {
        release: Notify,
        fail: bool,
    }

    #[async_trait]
    impl IdentityStore for GatedStore {
        async fn all_active_identities(&self) -> Result<Vec<Identity>> {
            Ok(Vec::new())
        }

        async fn identity(&self, _: &IdentityKey) -> Result<Option<Identity>> {
            Ok(None)
        }

        async fn create_identity(&self, _: &Identity) -> Result<()> {
            self.release.notified().await;
            if self.fail {
                Err(Error::operation("create_identity", "disk I/O error"))
            } else {
                Ok(())
            }
        }
    }

    struct BrokenStore;

    /// Commits to the inner store, then never returns, like a blocking
    /// write that finishes after its caller timed out.
    #[derive(Default)]
    struct CommitThenStallStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl IdentityStore for CommitThenStallStore {
        async fn all_active_identities(&self) -> Result<Vec<Identity>> {
            self.inner.all_active_identities().await
        }

        async fn identity(&self, key: &IdentityKey) -> Result<Option<Identity>> {
            self.inner.identity(key).await
        }

        async fn create_identity(&self, identity: &Identity) -> Result<()> {
            self.inner.create_identity(identity).await?;
            std::future::pending().await
        }
    }

    #[async_trait]
    impl IdentityStore for BrokenStore {
        async fn all_active_identities(&self) -> Result<Vec<Identity>> {
            Err(Error::operation("all_active_identities", "no such table"))
        }

        async fn identity(&self, _: &IdentityKey) -> Result<Option<Identity>> {
            Ok(None)
        }

        async fn create_identity(&self, _: &Identity) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_seeds_active_identities() {
        let store = Arc::new(InMemoryStore::new());
        store.create_identity(&identity("a")).await.unwrap();
        store.create_identity(&identity("b").deactivated()).await.unwrap();

        let registry = IdentityRegistry::load(store).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("a").is_some());
        assert!(registry.lookup("b").is_none());
    }

    #[tokio::test]
    async fn test_load_failure_is_fatal() {
        assert!(IdentityRegistry::load(Arc::new(BrokenStore)).await.is_err());
    }

    #[tokio::test]
    async fn test_create_then_lookup_then_recreate() {
        let registry = IdentityRegistry::load(Arc::new(InMemoryStore::new()))
            .await
            .unwrap();

        registry.create(identity("user_1")).await.unwrap();
        assert_eq!(registry.lookup("user_1").unwrap().display_name, "USER_1");
        assert!(!registry.is_creating("user_1"));

        let again = registry.create(identity("user_1")).await;
        assert!(matches!(again, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_concurrent_create_fails_fast_while_in_flight() {
        let store = Arc::new(GatedStore {
            release: Notify::new(),
            fail: false,
        });
        let registry = Arc::new(IdentityRegistry::load(store.clone()).await.unwrap());

        let first = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.create(identity("user_1")).await }
        });
        while !registry.is_creating("user_1") {
            tokio::task::yield_now().await;
        }

        assert!(registry.lookup("user_1").is_none());
        let second = registry.create(identity("user_1")).await;
        assert!(matches!(second, Err(Error::CreationInProgress(_))));

        store.release.notify_one();
        first.await.unwrap().unwrap();
        assert!(registry.lookup("user_1").is_some());
        assert!(!registry.is_creating("user_1"));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_pre_call_state() {
        let store = Arc::new(GatedStore {
            release: Notify::new(),
            fail: true,
        });
        store.release.notify_one();
        let registry = IdentityRegistry::load(store).await.unwrap();

        let result = registry.create(identity("user_1")).await;
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
        assert!(registry.lookup("user_1").is_none());
        assert!(!registry.is_creating("user_1"));
    }

    #[tokio::test]
    async fn test_cancelled_create_clears_marker() {
        let store = Arc::new(GatedStore {
            release: Notify::new(),
            fail: false,
        });
        let registry = IdentityRegistry::load(store).await.unwrap();

        let timed_out = crate::with_deadline(
            "create_identity",
            Duration::from_millis(20),
            registry.create(identity("user_1")),
        )
        .await;
        assert!(matches!(timed_out, Err(Error::Timeout { .. })));
        assert!(!registry.is_creating("user_1"));
        assert!(registry.lookup("user_1").is_none());
    }

    #[tokio::test]
    async fn test_create_committed_after_timeout_is_adopted_on_retry() {
        let registry = IdentityRegistry::load(Arc::new(CommitThenStallStore::default()))
            .await
            .unwrap();

        let timed_out = crate::with_deadline(
            "create_identity",
            Duration::from_millis(20),
            registry.create(identity("user_1")),
        )
        .await;
        assert!(matches!(timed_out, Err(Error::Timeout { .. })));
        assert!(registry.lookup("user_1").is_none());
        assert!(!registry.is_creating("user_1"));

        let retry = registry.create(identity("user_1")).await;
        assert!(matches!(retry, Err(Error::AlreadyExists(_))));
        assert_eq!(registry.lookup("user_1").unwrap().display_name, "USER_1");
        assert!(!registry.is_creating("user_1"));
    }

    #[tokio::test]
    async fn test_inactive_persisted_identity_is_not_adopted() {
        let store = Arc::new(InMemoryStore::new());
        let registry = IdentityRegistry::load(store.clone()).await.unwrap();
        store
            .create_identity(&identity("user_1").deactivated())
            .await
            .unwrap();

        let result = registry.create(identity("user_1")).await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert!(registry.lookup("user_1").is_none());
    }
}
