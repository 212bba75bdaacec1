//! Identity store trait.

use crate::Result;
use crate::models::{Identity, IdentityKey};
use async_trait::async_trait;

/// Durable store for registered identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns every active identity.
    async fn all_active_identities(&self) -> Result<Vec<Identity>>;

    /// Returns the persisted identity for `key`, active or not.
    async fn identity(&self, key: &IdentityKey) -> Result<Option<Identity>>;

    /// Persists a new identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`](crate::Error::AlreadyExists) if the
    /// key is already persisted.
    async fn create_identity(&self, identity: &Identity) -> Result<()>;
}
