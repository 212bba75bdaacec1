//! Per-request glue between the transport adapter and the core services.

use super::credential::CredentialManager;
use super::deduplication::{DeduplicationEngine, Verdict};
use super::registry::IdentityRegistry;
use crate::models::{Fingerprint, Identity};
use crate::observability::{RequestContext, current_request_id};
use crate::{Error, ErrorKind, Result, with_deadline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Default deadline around the store calls one request performs.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Coordinator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Deadline in milliseconds around each store call.
    pub request_timeout_ms: u64,
}

impl CoordinatorConfig {
    /// Deadline as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            #[allow(clippy::cast_possible_truncation)]
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

/// One piece of inbound content as the transport adapter decoded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundContent {
    /// Sender's identity key as received.
    pub sender: String,
    /// Where the content lives (the picture URL).
    pub locator: String,
    /// Precomputed fingerprint; derived from `locator` when absent.
    pub fingerprint: Option<Fingerprint>,
}

impl InboundContent {
    /// Content whose fingerprint is derived from its image URL.
    #[must_use]
    pub fn image(sender: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            locator: locator.into(),
            fingerprint: None,
        }
    }

    /// Sets an explicit fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }
}

/// Structured result handed back to the transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// First sighting; recorded for review.
    Accepted,
    /// Already recorded; stored as auto-denied.
    Duplicate,
    /// Sender is not registered.
    Rejected,
}

impl Outcome {
    /// Returns the outcome as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
        }
    }

    /// Short reply text shown to the sender.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Accepted => "成功",
            Self::Duplicate => "请勿重复上传",
            Self::Rejected => "当前用户并未注册，不能使用本服务",
        }
    }
}

/// Reply text for an upstream failure, carrying the request id for support.
#[must_use]
pub fn internal_error_message(request_id: &str) -> String {
    format!("服务器内部错误，请稍后重试 (trace_id={request_id})")
}

/// Wires identity checks, classification and the credential manager together.
pub struct Coordinator {
    registry: Arc<IdentityRegistry>,
    engine: Arc<DeduplicationEngine>,
    credentials: Option<Arc<CredentialManager>>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Creates a coordinator. `credentials` may be `None` for deployments
    /// that never call the upstream API.
    #[must_use]
    pub const fn new(
        registry: Arc<IdentityRegistry>,
        engine: Arc<DeduplicationEngine>,
        credentials: Option<Arc<CredentialManager>>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            engine,
            credentials,
            config,
        }
    }

    /// Handles one inbound piece of content inside a fresh request context.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if no fingerprint can be derived or the
    ///   locator is malformed
    /// - [`Error::Timeout`] if the store call exceeds the request deadline
    /// - the store's error otherwise
    pub async fn handle(&self, content: InboundContent) -> Result<Outcome> {
        self.handle_in(RequestContext::new(), content).await
    }

    /// Like [`handle`](Self::handle) with a caller-supplied context.
    pub async fn handle_in(
        &self,
        context: RequestContext,
        content: InboundContent,
    ) -> Result<Outcome> {
        let span = tracing::info_span!(
            "handle_content",
            request_id = %context.request_id(),
            sender = %content.sender
        );
        context
            .scope(self.classify_content(content).instrument(span))
            .await
    }

    async fn classify_content(&self, content: InboundContent) -> Result<Outcome> {
        let Some(identity) = self.registry.lookup(content.sender.trim()) else {
            tracing::info!("rejected unregistered sender");
            metrics::counter!("coordinator_requests_total", "outcome" => "rejected").increment(1);
            return Ok(Outcome::Rejected);
        };

        let fingerprint = match content.fingerprint {
            Some(fingerprint) => fingerprint,
            None => Fingerprint::from_image_url(&content.locator)?,
        };

        let result = with_deadline(
            "classify",
            self.config.request_timeout(),
            self.engine
                .classify(&fingerprint, &identity.key, &content.locator),
        )
        .await;

        let outcome = match result {
            Ok(classification) => match classification.verdict {
                Verdict::New => Outcome::Accepted,
                Verdict::Duplicate => Outcome::Duplicate,
            },
            Err(e) => {
                if e.kind() == ErrorKind::Upstream {
                    tracing::error!(
                        error = %e,
                        request_id = current_request_id().as_deref().unwrap_or("-"),
                        "classification failed"
                    );
                }
                metrics::counter!("coordinator_requests_total", "outcome" => "error").increment(1);
                return Err(e);
            },
        };

        let label = outcome.as_str();
        metrics::counter!("coordinator_requests_total", "outcome" => label).increment(1);
        tracing::info!(outcome = label, fingerprint = %fingerprint, "content handled");
        Ok(outcome)
    }

    /// Registers a new identity under the request deadline.
    ///
    /// # Errors
    ///
    /// Whatever [`IdentityRegistry::create`] returns, or [`Error::Timeout`].
    /// A timed-out creation releases its in-flight marker.
    pub async fn register(&self, identity: Identity) -> Result<()> {
        let context = RequestContext::new();
        let span = tracing::info_span!(
            "register_identity",
            request_id = %context.request_id(),
            key = %identity.key
        );
        context
            .scope(
                with_deadline(
                    "create_identity",
                    self.config.request_timeout(),
                    self.registry.create(identity),
                )
                .instrument(span),
            )
            .await
    }

    /// Current access token for outbound calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if no credential manager is configured
    /// or it holds no valid token yet.
    pub fn access_token(&self) -> Result<String> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::NotReady("credential manager not configured".to_string()))?
            .token()
    }

    /// The identity registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }
}
