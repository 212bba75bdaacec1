//! Two-tier deduplication engine.

use super::config::DeduplicationConfig;
use super::filter::MembershipFilter;
use super::types::{Classification, FilterHint, Verdict};
use crate::Result;
use crate::models::{Fingerprint, IdentityKey, NewContentRecord, validate_locator};
use crate::storage::ContentStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Classifies fingerprints as new or duplicate.
///
/// The membership filter answers first, then the store's conditional insert
/// decides. The filter never short-circuits to `Duplicate`: every call does
/// exactly one store insert, and concurrent callers for the same fingerprint
/// are linearized by that insert.
///
/// # Example
///
/// ```rust,ignore
/// let engine = DeduplicationEngine::build(store, DeduplicationConfig::default(), Utc::now()).await;
/// let result = engine.classify(&fingerprint, &owner, "http://x/1").await?;
/// if result.verdict.is_new() {
///     // first sighting
/// }
/// ```
pub struct DeduplicationEngine {
    store: Arc<dyn ContentStore>,
    filter: Option<MembershipFilter>,
}

impl DeduplicationEngine {
    /// Builds the engine, seeding the filter from the store.
    ///
    /// Loads the fingerprints recorded in `[now - window, now]` and sizes the
    /// filter for `max(filter_capacity, loaded)`. If the load fails the engine
    /// runs without a filter and every call reports
    /// [`FilterHint::Unavailable`].
    #[instrument(skip(store, config), fields(window_days = config.filter_window_days))]
    pub async fn build(
        store: Arc<dyn ContentStore>,
        config: DeduplicationConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let start = Instant::now();
        match store.fingerprints_in_window(now - config.window(), now).await {
            Ok(fingerprints) => {
                let filter = MembershipFilter::with_estimates(
                    config.filter_capacity.max(fingerprints.len()),
                    config.filter_error_rate,
                );
                for fingerprint in &fingerprints {
                    filter.insert(fingerprint);
                }
                tracing::info!(
                    loaded = fingerprints.len(),
                    bits = filter.bit_len(),
                    hashes = filter.hash_count(),
                    duration_ms = start.elapsed().as_millis(),
                    "membership filter built"
                );
                Self::with_filter(store, Some(filter))
            },
            Err(e) => {
                tracing::warn!(error = %e, "membership filter build failed, running without filter");
                metrics::counter!("dedup_filter_unavailable_total").increment(1);
                Self::with_filter(store, None)
            },
        }
    }

    /// Creates an engine around an explicit filter (or none).
    #[must_use]
    pub fn with_filter(store: Arc<dyn ContentStore>, filter: Option<MembershipFilter>) -> Self {
        Self { store, filter }
    }

    /// Returns the membership filter, if one was built.
    #[must_use]
    pub const fn filter(&self) -> Option<&MembershipFilter> {
        self.filter.as_ref()
    }

    /// Classifies `fingerprint` submitted by `owner`.
    ///
    /// Always writes one record: pending confirmation if new, auto-denied
    /// if duplicate. The fingerprint is added to the filter only after the
    /// store call succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`](crate::Error::InvalidInput) for a bad
    /// locator and the store's error if the insert fails. A store error is
    /// never turned into a verdict.
    #[instrument(
        skip(self, locator),
        fields(fingerprint = %fingerprint, owner = %owner)
    )]
    pub async fn classify(
        &self,
        fingerprint: &Fingerprint,
        owner: &IdentityKey,
        locator: &str,
    ) -> Result<Classification> {
        validate_locator(locator)?;
        let start = Instant::now();

        let filter_hint =
            FilterHint::from_lookup(self.filter.as_ref().and_then(|f| f.contains(fingerprint)));
        if filter_hint == FilterHint::Unavailable {
            metrics::counter!("dedup_filter_unavailable_total").increment(1);
        }

        let record = NewContentRecord::pending(fingerprint.clone(), owner.clone(), locator);
        let existed = match self.store.insert_if_fingerprint_absent(&record).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!(error = %e, "conditional insert failed");
                metrics::counter!("dedup_store_errors_total").increment(1);
                return Err(e);
            },
        };

        if let Some(filter) = &self.filter
            && !filter.insert(fingerprint)
        {
            metrics::counter!("dedup_filter_unavailable_total").increment(1);
        }

        let verdict = if existed {
            Verdict::Duplicate
        } else {
            Verdict::New
        };
        let result = Classification {
            verdict,
            filter_hint,
        };

        if result.is_false_positive() {
            metrics::counter!("dedup_filter_false_positive_total").increment(1);
        }
        if result.is_window_miss() {
            metrics::counter!("dedup_filter_window_miss_total").increment(1);
        }
        metrics::counter!("dedup_classifications_total", "verdict" => verdict.as_str())
            .increment(1);
        metrics::histogram!("dedup_classify_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        tracing::debug!(verdict = verdict.as_str(), hint = ?filter_hint, "classified");
        Ok(result)
    }
}
