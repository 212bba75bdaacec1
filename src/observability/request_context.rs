//! Per-request correlation ids.
//!
//! The coordinator scopes every inbound request in a [`RequestContext`];
//! anything running inside that future can read the id with
//! [`current_request_id`] and attach it to logs or error replies.

use std::future::Future;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Per-request context with a correlation id.
#[derive(Clone, Debug)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
}

impl RequestContext {
    /// Creates a context with a fresh UUID v4 id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_id(Uuid::new_v4().to_string())
    }

    /// Creates a context with an id supplied by the transport (for example
    /// the inbound message id).
    #[must_use]
    pub fn from_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            started: Instant::now(),
        }
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Runs `fut` with this context as the task's current context.
    pub async fn scope<F, T>(self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        TASK_CONTEXT.scope(self, fut).await
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

tokio::task_local! {
    static TASK_CONTEXT: RequestContext;
}

/// Returns the id of the request being handled by this task, if any.
#[must_use]
pub fn current_request_id() -> Option<String> {
    TASK_CONTEXT
        .try_with(|ctx| ctx.request_id.clone())
        .ok()
}
