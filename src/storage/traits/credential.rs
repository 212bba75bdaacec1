//! Credential mirror trait.

use crate::Result;
use crate::models::Credential;
use async_trait::async_trait;

/// Local durable mirror of the current credential, used for restart recovery.
#[async_trait]
pub trait CredentialStateStore: Send + Sync {
    /// Loads the last saved credential, `None` if nothing was saved.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Saves `credential`, replacing any previous one.
    async fn save(&self, credential: &Credential) -> Result<()>;
}
