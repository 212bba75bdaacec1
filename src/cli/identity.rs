//! Identity CLI commands.

use super::{Stores, write_err};
use crate::Result;
use crate::config::AppConfig;
use crate::models::{Identity, IdentityKey};
use crate::services::{Coordinator, DeduplicationEngine, IdentityRegistry};
use std::io::Write;
use std::sync::Arc;

/// Registers one identity through the coordinator so the request deadline applies.
pub(super) async fn add(
    stores: &Stores,
    config: &AppConfig,
    key: &str,
    name: &str,
    supervisor: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    let mut identity = Identity::new(IdentityKey::new(key)?, name);
    if let Some(supervisor) = supervisor {
        identity = identity.with_supervisor(IdentityKey::new(supervisor)?);
    }

    let registry = Arc::new(IdentityRegistry::load(Arc::clone(&stores.identities)).await?);
    let engine = Arc::new(DeduplicationEngine::with_filter(
        Arc::clone(&stores.content),
        None,
    ));
    let coordinator = Coordinator::new(registry, engine, None, config.coordinator);

    let key = identity.key.clone();
    coordinator.register(identity).await?;
    writeln!(out, "registered {key}").map_err(write_err)
}

/// Lists active identities, one per line.
pub(super) async fn list(stores: &Stores, out: &mut dyn Write) -> Result<()> {
    let identities = stores.identities.all_active_identities().await?;
    for identity in identities {
        writeln!(
            out,
            "{}\t{}\t{}",
            identity.key,
            identity.display_name,
            identity
                .supervisor
                .as_ref()
                .map_or("-", IdentityKey::as_str)
        )
        .map_err(write_err)?;
    }
    Ok(())
}
