//! Credential manager configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default upstream token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.weixin.qq.com/cgi-bin/token";

/// Shortest wait before a scheduled refresh.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// Configuration for the credential lifecycle manager and its fetcher.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `WECHAT_DEDUP_APP_ID` | string | empty | Application id |
/// | `WECHAT_DEDUP_APP_SECRET` | string | empty | Application secret |
/// | `WECHAT_DEDUP_TOKEN_ENDPOINT` | url | `https://api.weixin.qq.com/cgi-bin/token` | Token endpoint |
/// | `WECHAT_DEDUP_CREDENTIAL_STATE_PATH` | path | `credential.json` | Restart-recovery mirror |
/// | `WECHAT_DEDUP_REFRESH_FRACTION` | f64 | `0.8` | Refresh point within the validity window |
/// | `WECHAT_DEDUP_BACKOFF_SECS` | u64 | `5` | First retry delay after a failed fetch |
/// | `WECHAT_DEDUP_BACKOFF_MAX_SECS` | u64 | `5` | Retry delay cap |
///
/// With `backoff_max_secs == backoff_secs` retries use a fixed interval;
/// a larger cap doubles the delay per consecutive failure up to the cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Application id sent as `appid`.
    pub app_id: String,

    /// Application secret sent as `secret`. Never serialized.
    #[serde(with = "secret_string_serde")]
    pub app_secret: SecretString,

    /// Token endpoint URL.
    pub token_endpoint: String,

    /// Where the current credential is mirrored for restart recovery.
    pub state_path: PathBuf,

    /// Fraction of the validity window after which a refresh starts, in `(0, 1)`.
    pub refresh_fraction: f64,

    /// Delay after the first failed fetch.
    pub backoff_secs: u64,

    /// Upper bound on the retry delay.
    pub backoff_max_secs: u64,

    /// HTTP timeout for one fetch.
    pub request_timeout_secs: u64,
}

impl CredentialConfig {
    /// Applies overrides read through `lookup`.
    #[must_use]
    pub fn with_env_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("WECHAT_DEDUP_APP_ID") {
            self.app_id = v;
        }
        if let Some(v) = lookup("WECHAT_DEDUP_APP_SECRET") {
            self.app_secret = SecretString::from(v);
        }
        if let Some(v) = lookup("WECHAT_DEDUP_TOKEN_ENDPOINT") {
            self.token_endpoint = v;
        }
        if let Some(v) = lookup("WECHAT_DEDUP_CREDENTIAL_STATE_PATH") {
            self.state_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WECHAT_DEDUP_REFRESH_FRACTION").and_then(|v| v.parse().ok()) {
            self.refresh_fraction = v;
        }
        if let Some(v) = lookup("WECHAT_DEDUP_BACKOFF_SECS").and_then(|v| v.parse().ok()) {
            self.backoff_secs = v;
        }
        if let Some(v) = lookup("WECHAT_DEDUP_BACKOFF_MAX_SECS").and_then(|v| v.parse().ok()) {
            self.backoff_max_secs = v;
        }
        self
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `backoff_secs * 2^(attempt - 1)`, capped at `backoff_max_secs`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let cap = self.backoff_max_secs.max(self.backoff_secs);
        let secs = self
            .backoff_secs
            .saturating_mul(1 << (attempt - 1).min(20))
            .min(cap);
        Duration::from_secs(secs)
    }

    /// HTTP timeout for one fetch.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Builder method to set the refresh fraction.
    #[must_use]
    pub const fn with_refresh_fraction(mut self, fraction: f64) -> Self {
        self.refresh_fraction = fraction;
        self
    }

    /// Builder method to set the backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, secs: u64, max_secs: u64) -> Self {
        self.backoff_secs = secs;
        self.backoff_max_secs = max_secs;
        self
    }

    /// Builder method to set the application credentials.
    #[must_use]
    pub fn with_app(mut self, app_id: impl Into<String>, app_secret: SecretString) -> Self {
        self.app_id = app_id.into();
        self.app_secret = app_secret;
        self
    }

    /// Builder method to set the token endpoint.
    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: SecretString::from(String::new()),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            state_path: PathBuf::from("credential.json"),
            refresh_fraction: 0.8,
            backoff_secs: 5,
            backoff_max_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

/// Serde helpers that never write the secret back out.
mod secret_string_serde {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(_secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("***REDACTED***")
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecretString::from(s))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    #[test]
    fn test_default_backoff_is_fixed() {
        let config = CredentialConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(7), Duration::from_secs(5));
    }

    #[test]
    fn test_escalating_backoff_is_capped() {
        let config = CredentialConfig::default().with_backoff(1, 30);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(6), Duration::from_secs(30));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_secret_is_never_serialized() {
        let config = CredentialConfig::default()
            .with_app("wx123", SecretString::from("s3cr3t".to_string()));
        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("s3cr3t"));
        assert!(toml.contains("REDACTED"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WECHAT_DEDUP_APP_SECRET", "from-env"),
            ("WECHAT_DEDUP_REFRESH_FRACTION", "0.5"),
            ("WECHAT_DEDUP_BACKOFF_MAX_SECS", "x"),
        ]
        .into_iter()
        .collect();
        let config = CredentialConfig::default()
            .with_env_overrides_from(|k| env.get(k).map(ToString::to_string));

        assert_eq!(config.app_secret.expose_secret(), "from-env");
        assert!((config.refresh_fraction - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.backoff_max_secs, 5);
    }
}
