//! # wechat-dedup
//!
//! Stateful coordination layer behind a WeChat messaging webhook.
//!
//! The crate decides whether an inbound picture has been seen before, keeps a
//! registry of the people allowed to submit, and holds a continuously valid
//! access token for outbound API calls.
//!
//! ## Components
//!
//! - [`DeduplicationEngine`]: Bloom-filter hint plus an authoritative
//!   insert-if-absent against the durable store
//! - [`IdentityRegistry`]: read-through identity cache with at most one
//!   in-flight creation per key
//! - [`CredentialManager`]: background refresh of the access token with
//!   restart recovery and backoff
//! - [`Coordinator`]: per-request glue used by a transport adapter
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wechat_dedup::storage::InMemoryStore;
//! use wechat_dedup::{DeduplicationConfig, DeduplicationEngine, Fingerprint, IdentityKey};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let engine = DeduplicationEngine::build(store, DeduplicationConfig::default(), chrono::Utc::now()).await;
//! let fp = Fingerprint::parse("abc123")?;
//! let result = engine.classify(&fp, &IdentityKey::new("user_1")?, "http://x/1").await?;
//! assert!(result.verdict.is_new());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;
use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::AppConfig;
pub use models::{
    ContentRecord, Credential, Fingerprint, Identity, IdentityKey, NewContentRecord, RecordQuery,
    RecordStatus,
};
pub use services::{
    Classification, Coordinator, CoordinatorConfig, CredentialConfig, CredentialManager,
    DeduplicationConfig, DeduplicationEngine, FilterHint, IdentityRegistry, InboundContent,
    MembershipFilter, Outcome, Verdict,
};

/// Error type for all crate operations.
///
/// # Error Variant Triggers
///
/// | Variant | Kind | Raised When |
/// |---------|------|-------------|
/// | `InvalidInput` | Validation | Malformed fingerprint, empty key, bad locator or config value |
/// | `UnknownIdentity` | Validation | Content arrives from a sender the registry does not know |
/// | `AlreadyExists` | Contention | Identity is cached or already persisted |
/// | `CreationInProgress` | Contention | A creation for the same key is still running |
/// | `OperationFailed` | Upstream | `SQLite`, filesystem or HTTP failures |
/// | `Timeout` | Upstream | A request deadline elapsed around a store call |
/// | `NotReady` | `NotReady` | No valid access token has been obtained yet |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The sender is not a registered identity.
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    /// The identity already exists.
    #[error("identity '{0}' already exists")]
    AlreadyExists(String),

    /// Another creation for the same identity is in flight.
    #[error("identity '{0}' is being created")]
    CreationInProgress(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements or transactions fail
    /// - The credential state file cannot be read or written
    /// - The token endpoint is unreachable or answers with an error code
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A caller-imposed deadline elapsed.
    #[error("operation '{operation}' timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The service has no valid credential to hand out yet.
    #[error("not ready: {0}")]
    NotReady(String),
}

/// Coarse classification of [`Error`] used by transport adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before touching shared state; never retried automatically.
    Validation,
    /// Expected, non-fatal decline of the operation.
    Contention,
    /// Network or persistence failure; the caller owns the retry policy.
    Upstream,
    /// The credential is not available yet.
    NotReady,
}

impl Error {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::UnknownIdentity(_) => ErrorKind::Validation,
            Self::AlreadyExists(_) | Self::CreationInProgress(_) => ErrorKind::Contention,
            Self::OperationFailed { .. } | Self::Timeout { .. } => ErrorKind::Upstream,
            Self::NotReady(_) => ErrorKind::NotReady,
        }
    }

    /// Shorthand for building an [`Error::OperationFailed`].
    pub fn operation(operation: &str, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Runs `fut` under `deadline`, mapping expiry to [`Error::Timeout`].
///
/// Dropping the inner future on expiry is the cancellation path; services
/// release their per-call state in `Drop`.
pub async fn with_deadline<F, T>(operation: &str, deadline: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Error::Timeout {
            operation: operation.to_string(),
            after: deadline,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::operation("insert_record", "disk full");
        assert_eq!(
            err.to_string(),
            "operation 'insert_record' failed: disk full"
        );

        let err = Error::CreationInProgress("user_1".to_string());
        assert_eq!(err.to_string(), "identity 'user_1' is being created");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::UnknownIdentity("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::AlreadyExists("x".into()).kind(), ErrorKind::Contention);
        assert_eq!(
            Error::Timeout {
                operation: "classify".into(),
                after: Duration::from_millis(5),
            }
            .kind(),
            ErrorKind::Upstream
        );
        assert_eq!(Error::NotReady("x".into()).kind(), ErrorKind::NotReady);
    }

    #[tokio::test]
    async fn test_with_deadline_maps_elapsed_to_timeout() {
        let result: Result<()> = with_deadline("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));

        let ok = with_deadline("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.ok(), Some(7));
    }
}
