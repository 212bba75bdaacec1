//! Token CLI command.

use super::write_err;
use crate::Result;
use crate::config::AppConfig;
use crate::services::{CredentialManager, HttpCredentialFetcher, SystemClock};
use crate::storage::FileCredentialStore;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Obtains a token (recovering a persisted one when still valid) and prints
/// its expiry and a masked prefix. The token itself is never printed.
pub(super) async fn show(config: &AppConfig, wait_secs: u64, out: &mut dyn Write) -> Result<()> {
    if !config.has_app_credentials() {
        tracing::warn!("app_id or app_secret not configured, only a persisted token can be used");
    }

    let manager = CredentialManager::start(
        Arc::new(HttpCredentialFetcher::new(&config.credential)),
        Arc::new(FileCredentialStore::new(config.credential.state_path.clone())),
        Arc::new(SystemClock),
        config.credential.clone(),
    )
    .await;

    let result = manager.wait_ready(Duration::from_secs(wait_secs)).await;
    let state = manager.state();
    manager.shutdown().await;

    let credential = result?;
    writeln!(
        out,
        "token {}\texpires_at {}\tstate {}",
        credential.masked(),
        credential.expires_at().to_rfc3339(),
        state.as_str()
    )
    .map_err(write_err)
}
