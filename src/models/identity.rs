//! Registered participants.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Maximum identity key length, matching the `identities.key` column.
pub const MAX_IDENTITY_KEY_LENGTH: usize = 64;

/// External identity key (the WeChat `OpenID` of the sender).
///
/// Keys are trimmed, non-empty and immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Creates a validated identity key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the key is blank or longer than
    /// [`MAX_IDENTITY_KEY_LENGTH`].
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("identity key is empty".to_string()));
        }
        if trimmed.chars().count() > MAX_IDENTITY_KEY_LENGTH {
            return Err(Error::InvalidInput(format!(
                "identity key exceeds {MAX_IDENTITY_KEY_LENGTH} characters"
            )));
        }
        if trimmed.len() == key.len() {
            Ok(Self(key))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for IdentityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdentityKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<IdentityKey> for String {
    fn from(key: IdentityKey) -> Self {
        key.0
    }
}

/// A registered participant.
///
/// `supervisor` is a soft reference: the referenced identity need not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique external key.
    pub key: IdentityKey,
    /// Display name.
    pub display_name: String,
    /// Optional supervisor (team leader).
    pub supervisor: Option<IdentityKey>,
    /// Whether the identity may submit content.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Creates an active identity without a supervisor, stamped now.
    #[must_use]
    pub fn new(key: IdentityKey, display_name: impl Into<String>) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            supervisor: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Sets the supervisor.
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: IdentityKey) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Marks the identity inactive.
    #[must_use]
    pub const fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use test_case::test_case;

    #[test_case("user_1", "user_1" ; "plain")]
    #[test_case("  oX9a-b  ", "oX9a-b" ; "trimmed")]
    fn test_identity_key_accepts(input: &str, expected: &str) {
        assert_eq!(IdentityKey::new(input).unwrap().as_str(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    fn test_identity_key_rejects_blank(input: &str) {
        assert!(matches!(
            IdentityKey::new(input),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_identity_key_rejects_overlong() {
        let key = "k".repeat(MAX_IDENTITY_KEY_LENGTH + 1);
        assert!(IdentityKey::new(key).is_err());
        assert!(IdentityKey::new("k".repeat(MAX_IDENTITY_KEY_LENGTH)).is_ok());
    }

    #[test]
    fn test_identity_builders() {
        let identity = Identity::new(IdentityKey::new("user_1").unwrap(), "Alex")
            .with_supervisor(IdentityKey::new("lead").unwrap())
            .deactivated();

        assert_eq!(identity.display_name, "Alex");
        assert_eq!(identity.supervisor.as_ref().map(IdentityKey::as_str), Some("lead"));
        assert!(!identity.active);
    }

    #[test]
    fn test_identity_key_serde_validates() {
        let key: IdentityKey = serde_json::from_str("\"user_1\"").unwrap();
        assert_eq!(key.as_str(), "user_1");
        assert!(serde_json::from_str::<IdentityKey>("\"\"").is_err());
    }
}
