//! Background credential refresh.

use super::clock::Clock;
use super::config::{CredentialConfig, MIN_REFRESH_DELAY};
use super::fetcher::CredentialFetcher;
use crate::models::Credential;
use crate::storage::CredentialStateStore;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

/// Where the refresh loop is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No credential obtained yet.
    Uninitialized,
    /// A fetch is in progress.
    Refreshing,
    /// Holding a credential, waiting for the next scheduled refresh.
    Valid,
    /// Waiting to retry after a failed fetch.
    Backoff,
}

impl ManagerState {
    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Refreshing => "refreshing",
            Self::Valid => "valid",
            Self::Backoff => "backoff",
        }
    }
}

type Slot = Option<Arc<Credential>>;

/// Keeps one access token valid in the background.
///
/// # Concurrency Model
///
/// One tokio task owns the refresh loop and is the only writer of a
/// `watch` channel holding `Option<Arc<Credential>>`. A refresh replaces the
/// whole `Arc`; readers clone it out of the channel and never wait on I/O.
///
/// # Lifecycle
///
/// ```text
/// Uninitialized ──▶ Refreshing ──ok──▶ Valid ──(fraction of validity)──▶ Refreshing
///                        │  ▲
///                      fail │
///                        ▼  │
///                       Backoff
/// ```
///
/// Fetch failures retry forever. Dropping the manager stops the task;
/// [`shutdown`](Self::shutdown) also waits for it to finish.
pub struct CredentialManager {
    slot: watch::Receiver<Slot>,
    state: watch::Receiver<ManagerState>,
    trigger: Arc<Notify>,
    clock: Arc<dyn Clock>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CredentialManager {
    /// Recovers any persisted credential and spawns the refresh loop.
    ///
    /// A recovered credential that is still valid is served immediately and
    /// refreshed on its normal schedule; otherwise the loop fetches at once.
    /// A failing state store is treated as empty.
    #[instrument(skip_all)]
    pub async fn start(
        fetcher: Arc<dyn CredentialFetcher>,
        state_store: Arc<dyn CredentialStateStore>,
        clock: Arc<dyn Clock>,
        config: CredentialConfig,
    ) -> Self {
        let recovered = match state_store.load().await {
            Ok(Some(credential)) if credential.is_valid_at(clock.now()) => {
                tracing::info!(expires_at = %credential.expires_at(), "recovered persisted credential");
                Some(Arc::new(credential))
            },
            Ok(Some(credential)) => {
                tracing::info!(expired_at = %credential.expires_at(), "persisted credential expired");
                None
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not load persisted credential");
                None
            },
        };

        let initial_state = if recovered.is_some() {
            ManagerState::Valid
        } else {
            ManagerState::Uninitialized
        };
        let (slot_tx, slot_rx) = watch::channel(recovered);
        let (state_tx, state_rx) = watch::channel(initial_state);
        let (stop_tx, stop_rx) = oneshot::channel();
        let trigger = Arc::new(Notify::new());

        let refresher = Refresher {
            fetcher,
            state_store,
            clock: Arc::clone(&clock),
            config,
            slot: slot_tx,
            state: state_tx,
            trigger: Arc::clone(&trigger),
        };
        let task = tokio::spawn(refresher.run(stop_rx));

        Self {
            slot: slot_rx,
            state: state_rx,
            trigger,
            clock,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Returns the current token without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if no credential was ever obtained or the
    /// held one has expired and no refresh has succeeded since.
    pub fn token(&self) -> Result<String> {
        self.credential()
            .map(|c| c.access_token().to_string())
            .ok_or_else(|| Error::NotReady("no valid access token".to_string()))
    }

    /// Returns the current credential if it is still valid.
    #[must_use]
    pub fn credential(&self) -> Option<Arc<Credential>> {
        let current = self.slot.borrow().clone()?;
        current.is_valid_at(self.clock.now()).then_some(current)
    }

    /// Current state of the refresh loop.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state.borrow()
    }

    /// Wakes the loop to refresh now instead of at the scheduled time.
    ///
    /// A request made while a refresh is already running is satisfied by
    /// that refresh if it succeeds; it does not queue a second fetch.
    pub fn refresh_now(&self) {
        self.trigger.notify_one();
    }

    /// Waits until a valid credential is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if none appears within `timeout` or the
    /// loop has stopped.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<Arc<Credential>> {
        let mut slot = self.slot.clone();
        let wait = async {
            loop {
                let current = slot.borrow_and_update().clone();
                if let Some(credential) = current
                    && credential.is_valid_at(self.clock.now())
                {
                    return Ok(credential);
                }
                if slot.changed().await.is_err() {
                    return Err(Error::NotReady("credential manager stopped".to_string()));
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::NotReady(format!("no access token after {timeout:?}")))?
    }

    /// Stops the refresh loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "credential refresh task ended abnormally");
        }
        tracing::info!("credential manager stopped");
    }
}

impl Drop for CredentialManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// State owned by the background task.
struct Refresher {
    fetcher: Arc<dyn CredentialFetcher>,
    state_store: Arc<dyn CredentialStateStore>,
    clock: Arc<dyn Clock>,
    config: CredentialConfig,
    slot: watch::Sender<Slot>,
    state: watch::Sender<ManagerState>,
    trigger: Arc<Notify>,
}

impl Refresher {
    async fn run(self, mut stop: oneshot::Receiver<()>) {
        let mut failures: u32 = 0;
        let mut delay = self
            .slot
            .borrow()
            .as_ref()
            .map_or(Duration::ZERO, |c| self.refresh_delay(c));

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                () = self.trigger.notified() => {},
                () = tokio::time::sleep(delay) => {},
            }

            self.state.send_replace(ManagerState::Refreshing);
            let fetched = tokio::select! {
                biased;
                _ = &mut stop => break,
                fetched = self.fetcher.fetch() => fetched,
            };

            let issued = fetched.and_then(|token| {
                Credential::from_expires_in(token.access_token, self.clock.now(), token.expires_in_secs)
            });

            match issued {
                Ok(credential) => {
                    failures = 0;
                    let credential = Arc::new(credential);
                    delay = self.refresh_delay(&credential);
                    self.publish(Arc::clone(&credential));
                    self.persist(&credential).await;
                    self.discard_pending_trigger().await;
                    tracing::info!(
                        expires_at = %credential.expires_at(),
                        next_refresh_secs = delay.as_secs(),
                        "access token refreshed"
                    );
                },
                Err(e) => {
                    failures = failures.saturating_add(1);
                    delay = self.config.backoff_delay(failures);
                    self.state.send_replace(ManagerState::Backoff);
                    metrics::counter!("credential_refresh_total", "result" => "failure")
                        .increment(1);
                    tracing::warn!(
                        error = %e,
                        attempt = failures,
                        retry_in_secs = delay.as_secs(),
                        "access token refresh failed"
                    );
                },
            }
        }
        tracing::debug!("credential refresh loop exited");
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish(&self, credential: Arc<Credential>) {
        let remaining = (credential.expires_at() - self.clock.now()).num_seconds();
        self.slot.send_replace(Some(credential));
        self.state.send_replace(ManagerState::Valid);
        metrics::counter!("credential_refresh_total", "result" => "success").increment(1);
        metrics::gauge!("credential_seconds_until_expiry").set(remaining as f64);
    }

    /// Consumes a [`CredentialManager::refresh_now`] that arrived while the
    /// refresh that just succeeded was in flight.
    async fn discard_pending_trigger(&self) {
        tokio::select! {
            biased;
            () = self.trigger.notified() => {
                tracing::debug!("refresh request satisfied by the refresh in flight");
            },
            () = std::future::ready(()) => {},
        }
    }

    async fn persist(&self, credential: &Credential) {
        if let Err(e) = self.state_store.save(credential).await {
            tracing::warn!(error = %e, "could not persist credential");
            metrics::counter!("credential_persist_failures_total").increment(1);
        }
    }

    /// Time until `fraction` of the validity window has passed, at least
    /// one second.
    fn refresh_delay(&self, credential: &Credential) -> Duration {
        let at = credential.refresh_at(self.config.refresh_fraction);
        (at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(MIN_REFRESH_DELAY)
    }
}
