//! Row conversion for the `SQLite` store.
//!
//! Rows are read into primitive structs inside the blocking closure and
//! converted to validated models afterwards, so a bad row surfaces as an
//! [`Error::OperationFailed`] instead of a panic.

use crate::models::{ContentRecord, Fingerprint, Identity, IdentityKey, RecordStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::Row;

/// Raw `records` row.
#[derive(Debug)]
pub struct RecordRow {
    pub id: i64,
    pub fingerprint: String,
    pub owner: String,
    pub locator: String,
    pub status: i64,
    pub created_at: i64,
}

impl RecordRow {
    /// Column list matching [`RecordRow::from_row`].
    pub const COLUMNS: &'static str = "id, fingerprint, owner, locator, status, created_at";

    /// Reads a row selected with [`RecordRow::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fingerprint: row.get(1)?,
            owner: row.get(2)?,
            locator: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    /// Converts into a validated [`ContentRecord`].
    pub fn into_record(self) -> Result<ContentRecord> {
        let status = RecordStatus::from_code(self.status).ok_or_else(|| {
            Error::operation(
                "decode_record",
                format!("record {} has unknown status code {}", self.id, self.status),
            )
        })?;
        Ok(ContentRecord {
            id: self.id,
            fingerprint: Fingerprint::parse(self.fingerprint).map_err(decode_error)?,
            owner: IdentityKey::new(self.owner).map_err(decode_error)?,
            locator: self.locator,
            status,
            created_at: from_millis(self.created_at)?,
        })
    }
}

/// Raw `identities` row.
#[derive(Debug)]
pub struct IdentityRow {
    pub key: String,
    pub display_name: String,
    pub supervisor: Option<String>,
    pub active: bool,
    pub created_at: i64,
}

impl IdentityRow {
    /// Column list matching [`IdentityRow::from_row`].
    pub const COLUMNS: &'static str = "key, display_name, supervisor, active, created_at";

    /// Reads a row selected with [`IdentityRow::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            display_name: row.get(1)?,
            supervisor: row.get(2)?,
            active: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Converts into a validated [`Identity`].
    pub fn into_identity(self) -> Result<Identity> {
        Ok(Identity {
            key: IdentityKey::new(self.key).map_err(decode_error)?,
            display_name: self.display_name,
            supervisor: self
                .supervisor
                .filter(|s| !s.trim().is_empty())
                .map(IdentityKey::new)
                .transpose()
                .map_err(decode_error)?,
            active: self.active,
            created_at: from_millis(self.created_at)?,
        })
    }
}

/// Converts a stored millisecond timestamp.
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::operation("decode_timestamp", format!("out of range: {millis}")))
}

#[allow(clippy::needless_pass_by_value)]
fn decode_error(e: Error) -> Error {
    Error::operation("decode_row", e)
}
