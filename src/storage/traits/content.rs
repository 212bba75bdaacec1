//! Content record store trait.

use crate::Result;
use crate::models::{ContentRecord, Fingerprint, IdentityKey, NewContentRecord, RecordQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable store for content records.
///
/// The store, not any in-memory structure, is the system of record for
/// fingerprint uniqueness.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Atomically inserts `record` if no row with its fingerprint exists.
    ///
    /// When a row already exists a second row is still written, tagged
    /// [`RecordStatus::AutoDenied`](crate::models::RecordStatus::AutoDenied),
    /// and `true` is returned. Exactly one concurrent caller per fingerprint
    /// observes `false`.
    async fn insert_if_fingerprint_absent(&self, record: &NewContentRecord) -> Result<bool>;

    /// Returns the fingerprints of records created inside `[from, to]`.
    async fn fingerprints_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Fingerprint>>;

    /// Lists records submitted by `owner`, oldest first.
    async fn records_by_owner(
        &self,
        owner: &IdentityKey,
        query: &RecordQuery,
    ) -> Result<Vec<ContentRecord>>;

    /// Lists records of every identity supervised by `supervisor`, oldest first.
    async fn records_by_supervisor(
        &self,
        supervisor: &IdentityKey,
        query: &RecordQuery,
    ) -> Result<Vec<ContentRecord>>;
}
