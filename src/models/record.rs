//! Content records written on every classification attempt.

use super::{Fingerprint, IdentityKey};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum locator length (lowest common URL limit across browsers).
pub const MAX_LOCATOR_LENGTH: usize = 2083;

/// Review status of a content record.
///
/// Ordered so that range queries over the storage code work:
/// `AutoDenied < Denied < PendingConfirmation < Confirmed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum RecordStatus {
    /// Rejected automatically because the fingerprint was already recorded.
    #[serde(rename = "autoDenied")]
    AutoDenied,
    /// Rejected by a reviewer.
    #[serde(rename = "denied")]
    Denied,
    /// First sighting, awaiting review.
    #[default]
    #[serde(rename = "waitingForConfirm")]
    PendingConfirmation,
    /// Accepted by a reviewer.
    #[serde(rename = "confirmed")]
    Confirmed,
}

impl RecordStatus {
    /// All statuses in ascending order.
    pub const ALL: [Self; 4] = [
        Self::AutoDenied,
        Self::Denied,
        Self::PendingConfirmation,
        Self::Confirmed,
    ];

    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AutoDenied => "autoDenied",
            Self::Denied => "denied",
            Self::PendingConfirmation => "waitingForConfirm",
            Self::Confirmed => "confirmed",
        }
    }

    /// Returns the integer code persisted in the `records.status` column.
    ///
    /// Code 1 is reserved for unknown values written by older deployments.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::AutoDenied => 2,
            Self::Denied => 3,
            Self::PendingConfirmation => 4,
            Self::Confirmed => 5,
        }
    }

    /// Decodes a persisted status code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(Self::AutoDenied),
            3 => Some(Self::Denied),
            4 => Some(Self::PendingConfirmation),
            5 => Some(Self::Confirmed),
            _ => None,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("unknown record status: {s}")))
    }
}

/// Validates a content locator.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the locator is blank or longer than
/// [`MAX_LOCATOR_LENGTH`].
pub fn validate_locator(locator: &str) -> Result<()> {
    if locator.trim().is_empty() {
        return Err(Error::InvalidInput("locator is empty".to_string()));
    }
    if locator.len() > MAX_LOCATOR_LENGTH {
        return Err(Error::InvalidInput(format!(
            "locator exceeds {MAX_LOCATOR_LENGTH} characters"
        )));
    }
    Ok(())
}

/// A record about to be written by the conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContentRecord {
    /// Content fingerprint.
    pub fingerprint: Fingerprint,
    /// Submitting identity.
    pub owner: IdentityKey,
    /// Where the content lives.
    pub locator: String,
    /// Status requested for the row if the fingerprint is new.
    pub status: RecordStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewContentRecord {
    /// Creates a pending-confirmation record stamped now.
    #[must_use]
    pub fn pending(fingerprint: Fingerprint, owner: IdentityKey, locator: impl Into<String>) -> Self {
        Self {
            fingerprint,
            owner,
            locator: locator.into(),
            status: RecordStatus::PendingConfirmation,
            created_at: Utc::now(),
        }
    }
}

/// A persisted content record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Store-assigned row id.
    pub id: i64,
    /// Content fingerprint.
    pub fingerprint: Fingerprint,
    /// Submitting identity.
    pub owner: IdentityKey,
    /// Where the content lives.
    pub locator: String,
    /// Review status.
    pub status: RecordStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Time window and status range for record reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordQuery {
    /// Inclusive lower bound on `created_at`.
    pub from: DateTime<Utc>,
    /// Inclusive upper bound on `created_at`.
    pub to: DateTime<Utc>,
    /// Lowest status included.
    pub min_status: RecordStatus,
    /// Highest status included.
    pub max_status: RecordStatus,
}

impl RecordQuery {
    /// Matches every status inside `[from, to]`.
    #[must_use]
    pub const fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            min_status: RecordStatus::AutoDenied,
            max_status: RecordStatus::Confirmed,
        }
    }

    /// Restricts the status range.
    #[must_use]
    pub const fn with_statuses(mut self, min: RecordStatus, max: RecordStatus) -> Self {
        self.min_status = min;
        self.max_status = max;
        self
    }

    /// Returns `true` if the record falls inside the window and status range.
    #[must_use]
    pub fn matches(&self, created_at: DateTime<Utc>, status: RecordStatus) -> bool {
        created_at >= self.from
            && created_at <= self.to
            && status >= self.min_status
            && status <= self.max_status
    }
}
