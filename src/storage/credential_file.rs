//! File-backed credential mirror.

use super::traits::CredentialStateStore;
use crate::models::{Credential, PersistedCredential};
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores the current credential as JSON at a fixed path.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves the previous credential intact. On Unix the
/// file is created with mode `0600`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStateStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::operation("load_credential", e)),
        };
        let persisted: PersistedCredential =
            serde_json::from_slice(&bytes).map_err(|e| Error::operation("load_credential", e))?;
        Ok(Some(Credential::from(persisted)))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::operation("save_credential", e))?;
        }

        let body = serde_json::to_vec_pretty(&PersistedCredential::from(credential))
            .map_err(|e| Error::operation("save_credential", e))?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, body)
            .await
            .map_err(|e| Error::operation("save_credential", e))?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, Permissions::from_mode(0o600))
                .await
                .map_err(|e| Error::operation("save_credential", e))?;
        }

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::operation("save_credential", e))?;
        tracing::debug!(path = %self.path.display(), "credential state saved");
        Ok(())
    }
}
