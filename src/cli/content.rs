//! Content CLI commands.

use super::{Stores, write_err};
use crate::Result;
use crate::config::AppConfig;
use crate::models::{Fingerprint, IdentityKey, RecordQuery};
use crate::services::{Coordinator, DeduplicationEngine, IdentityRegistry, InboundContent};
use chrono::{Duration, Utc};
use std::io::Write;
use std::sync::Arc;

/// Classifies one piece of content and prints the outcome and reply text.
pub(super) async fn classify(
    stores: &Stores,
    config: &AppConfig,
    owner: &str,
    locator: &str,
    fingerprint: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    let registry = Arc::new(IdentityRegistry::load(Arc::clone(&stores.identities)).await?);
    let engine = Arc::new(
        DeduplicationEngine::build(
            Arc::clone(&stores.content),
            config.deduplication.clone(),
            Utc::now(),
        )
        .await,
    );
    let coordinator = Coordinator::new(registry, engine, None, config.coordinator);

    let mut content = InboundContent::image(owner, locator);
    if let Some(fingerprint) = fingerprint {
        content = content.with_fingerprint(Fingerprint::parse(fingerprint)?);
    }

    let outcome = coordinator.handle(content).await?;
    writeln!(out, "{}\t{}", outcome.as_str(), outcome.message()).map_err(write_err)
}

/// Lists the last `days` days of records, one per line.
pub(super) async fn records(
    stores: &Stores,
    owner: &str,
    days: u32,
    supervised: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let owner = IdentityKey::new(owner)?;
    let now = Utc::now();
    let query = RecordQuery::window(now - Duration::days(i64::from(days)), now);

    let records = if supervised {
        stores.content.records_by_supervisor(&owner, &query).await?
    } else {
        stores.content.records_by_owner(&owner, &query).await?
    };

    for record in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.status,
            record.owner,
            record.fingerprint,
            record.locator
        )
        .map_err(write_err)?;
    }
    Ok(())
}
