//! Access credentials for the upstream API.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Short-lived access token plus its validity window.
///
/// Immutable: a refresh replaces the whole value, it never edits fields.
pub struct Credential {
    access_token: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential issued at `issued_at` and valid for `validity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the expiry is not representable.
    pub fn new(
        access_token: SecretString,
        issued_at: DateTime<Utc>,
        validity: Duration,
    ) -> Result<Self> {
        let expires_at = issued_at
            .checked_add_signed(validity)
            .ok_or_else(|| Error::InvalidInput(format!("validity {validity} overflows expiry")))?;
        Ok(Self {
            access_token,
            issued_at,
            expires_at,
        })
    }

    /// Creates a credential from an upstream `expires_in` in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the seconds are out of range.
    pub fn from_expires_in(
        access_token: SecretString,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
    ) -> Result<Self> {
        let validity = Duration::try_seconds(expires_in_secs).ok_or_else(|| {
            Error::InvalidInput(format!("expires_in {expires_in_secs}s is out of range"))
        })?;
        Self::new(access_token, issued_at, validity)
    }

    /// Returns the token. Callers must not log it.
    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// When the credential was obtained.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the credential stops being valid.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Total validity window.
    #[must_use]
    pub fn validity(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    /// A credential is valid strictly before its expiry.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Instant at which a refresh should start, `fraction` of the way
    /// through the validity window.
    #[must_use]
    pub fn refresh_at(&self, fraction: f64) -> DateTime<Utc> {
        let window_ms = self.validity().num_milliseconds().max(0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let offset_ms = (window_ms as f64 * fraction.clamp(0.0, 1.0)).round() as i64;
        self.issued_at + Duration::milliseconds(offset_ms)
    }

    /// Masked token prefix safe to show operators.
    #[must_use]
    pub fn masked(&self) -> String {
        let token = self.access_token.expose_secret();
        let prefix: String = token.chars().take(6).collect();
        format!("{prefix}***")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"***REDACTED***")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// On-disk form of a [`Credential`] for restart recovery.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersistedCredential {
    /// The token in clear text; the state file is created with owner-only permissions.
    pub access_token: String,
    /// When the credential was obtained.
    pub issued_at: DateTime<Utc>,
    /// When the credential expires.
    pub expires_at: DateTime<Utc>,
}

impl From<&Credential> for PersistedCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token().to_string(),
            issued_at: credential.issued_at,
            expires_at: credential.expires_at,
        }
    }
}

impl From<PersistedCredential> for Credential {
    fn from(persisted: PersistedCredential) -> Self {
        Self {
            access_token: SecretString::from(persisted.access_token),
            issued_at: persisted.issued_at,
            expires_at: persisted.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn credential(validity_secs: i64) -> Credential {
        let issued = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Credential::new(
            SecretString::from("ACCESS_TOKEN_123".to_string()),
            issued,
            Duration::seconds(validity_secs),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_strictly_before_expiry() {
        let cred = credential(7200);
        assert!(cred.is_valid_at(cred.issued_at()));
        assert!(cred.is_valid_at(cred.expires_at() - Duration::milliseconds(1)));
        assert!(!cred.is_valid_at(cred.expires_at()));
    }

    #[test]
    fn test_refresh_at_fraction() {
        let cred = credential(7200);
        assert_eq!(cred.refresh_at(0.8), cred.issued_at() + Duration::seconds(5760));
        assert_eq!(cred.refresh_at(1.0), cred.expires_at());
        assert_eq!(cred.refresh_at(2.0), cred.expires_at());
    }

    #[test]
    fn test_unrepresentable_expiry_is_rejected() {
        let issued = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let token = || SecretString::from("T".to_string());

        assert!(matches!(
            Credential::from_expires_in(token(), issued, 10_000_000_000_000),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Credential::from_expires_in(token(), issued, i64::MAX),
            Err(Error::InvalidInput(_))
        ));
        assert!(Credential::new(token(), issued, Duration::MAX).is_err());
        assert_eq!(
            Credential::from_expires_in(token(), issued, 7200).unwrap().validity(),
            Duration::seconds(7200)
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let cred = credential(60);
        let debug = format!("{cred:?}");
        assert!(!debug.contains("ACCESS_TOKEN_123"));
        assert_eq!(cred.masked(), "ACCESS***");
    }

    #[test]
    fn test_persisted_roundtrip_keeps_window() {
        let cred = credential(60);
        let json = serde_json::to_string(&PersistedCredential::from(&cred)).unwrap();
        let back: PersistedCredential = serde_json::from_str(&json).unwrap();
        let restored = Credential::from(back);
        assert_eq!(restored.access_token(), "ACCESS_TOKEN_123");
        assert_eq!(restored.expires_at(), cred.expires_at());
    }
}
