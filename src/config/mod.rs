//! Configuration management.
//!
//! [`AppConfig`] is read from TOML, then `WECHAT_DEDUP_*` environment
//! variables override individual fields.
//!
//! ```toml
//! [database]
//! path = "wechat-dedup.db"
//!
//! [deduplication]
//! filter_capacity = 1000
//! filter_error_rate = 0.01
//! filter_window_days = 28
//!
//! [credential]
//! app_id = "wx0000000000000000"
//! state_path = "credential.json"
//! refresh_fraction = 0.8
//!
//! [coordinator]
//! request_timeout_ms = 5000
//! ```

use crate::services::{CoordinatorConfig, CredentialConfig, DeduplicationConfig};
use crate::{Error, Result};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "wechat-dedup.toml";

/// Default `SQLite` database file.
pub const DEFAULT_DATABASE_PATH: &str = "wechat-dedup.db";

/// Durable store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Durable store.
    pub database: DatabaseConfig,
    /// Duplicate detection.
    pub deduplication: DeduplicationConfig,
    /// Access-token lifecycle.
    pub credential: CredentialConfig,
    /// Per-request deadlines.
    pub coordinator: CoordinatorConfig,
}

impl AppConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this shape.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_config_file", format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Loads the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, `./wechat-dedup.toml` is
    /// tried, then the platform config directory; if neither exists the
    /// defaults are used. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_paths().into_iter().find(|p| p.exists()) {
                Some(found) => {
                    tracing::debug!(path = %found.display(), "loading config file");
                    Self::load_from_file(&found)?
                },
                None => Self::default(),
            },
        };
        Ok(config.with_env_overrides_from(|key| std::env::var(key).ok()))
    }

    /// Candidate config files in lookup order.
    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "wechat-dedup") {
            paths.push(dirs.config_dir().join("config.toml"));
        }
        paths
    }

    /// Applies `WECHAT_DEDUP_*` overrides read through `lookup`.
    ///
    /// Unset or unparsable variables leave the field unchanged.
    #[must_use]
    pub fn with_env_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("WECHAT_DEDUP_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WECHAT_DEDUP_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.coordinator.request_timeout_ms = v;
        }
        self.deduplication = self.deduplication.with_env_overrides_from(&lookup);
        self.credential = self.credential.with_env_overrides_from(&lookup);
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidInput(msg.to_string()));

        if self.database.path.as_os_str().is_empty() {
            return invalid("database.path must not be empty");
        }
        if self.deduplication.filter_capacity == 0 {
            return invalid("deduplication.filter_capacity must be positive");
        }
        let rate = self.deduplication.filter_error_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return invalid("deduplication.filter_error_rate must be in (0, 1)");
        }
        let fraction = self.credential.refresh_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return invalid("credential.refresh_fraction must be in (0, 1)");
        }
        if self.credential.backoff_secs == 0 {
            return invalid("credential.backoff_secs must be positive");
        }
        if self.credential.backoff_max_secs < self.credential.backoff_secs {
            return invalid("credential.backoff_max_secs must be >= credential.backoff_secs");
        }
        if self.coordinator.request_timeout_ms == 0 {
            return invalid("coordinator.request_timeout_ms must be positive");
        }
        Ok(())
    }

    /// Returns `true` if an application id and secret are both set.
    #[must_use]
    pub fn has_app_credentials(&self) -> bool {
        !self.credential.app_id.is_empty() && !self.credential.app_secret.expose_secret().is_empty()
    }

    /// Renders the configuration as TOML with secrets redacted.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_redacted_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::operation("serialize_config", e))
    }
}
