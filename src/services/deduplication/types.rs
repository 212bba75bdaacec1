//! Classification result types.

use serde::{Deserialize, Serialize};

/// Authoritative outcome of a classification, decided by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// First successful claim of the fingerprint.
    New,
    /// The fingerprint was already recorded; the row was tagged auto-denied.
    Duplicate,
}

impl Verdict {
    /// Returns `true` for [`Verdict::New`].
    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, Self::New)
    }

    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Duplicate => "duplicate",
        }
    }
}

/// What the membership filter said before the store call.
///
/// Informational only: the verdict never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterHint {
    /// Definitely not seen within the build window or since startup.
    Unseen,
    /// Possibly seen (may be a false positive).
    MaybeSeen,
    /// No filter, or its lock was poisoned.
    Unavailable,
}

impl FilterHint {
    pub(crate) const fn from_lookup(lookup: Option<bool>) -> Self {
        match lookup {
            Some(true) => Self::MaybeSeen,
            Some(false) => Self::Unseen,
            None => Self::Unavailable,
        }
    }
}

/// Result of [`DeduplicationEngine::classify`](super::DeduplicationEngine::classify).
///
/// # Example
///
/// ```rust
/// use wechat_dedup::{Classification, FilterHint, Verdict};
///
/// let result = Classification { verdict: Verdict::New, filter_hint: FilterHint::Unseen };
/// assert!(result.verdict.is_new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Store-decided verdict.
    pub verdict: Verdict,
    /// Filter answer observed before the store call.
    pub filter_hint: FilterHint,
}

impl Classification {
    /// Filter said "maybe seen" but the store accepted the fingerprint as new.
    #[must_use]
    pub const fn is_false_positive(&self) -> bool {
        matches!(
            (self.filter_hint, self.verdict),
            (FilterHint::MaybeSeen, Verdict::New)
        )
    }

    /// Filter said "unseen" but the store already had the fingerprint,
    /// i.e. it was recorded before the build window.
    #[must_use]
    pub const fn is_window_miss(&self) -> bool {
        matches!(
            (self.filter_hint, self.verdict),
            (FilterHint::Unseen, Verdict::Duplicate)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(FilterHint::MaybeSeen, Verdict::New, true, false ; "false positive")]
    #[test_case(FilterHint::Unseen, Verdict::Duplicate, false, true ; "window miss")]
    #[test_case(FilterHint::MaybeSeen, Verdict::Duplicate, false, false ; "confirmed duplicate")]
    #[test_case(FilterHint::Unavailable, Verdict::New, false, false ; "no filter")]
    fn test_hint_accounting(hint: FilterHint, verdict: Verdict, fp: bool, miss: bool) {
        let result = Classification {
            verdict,
            filter_hint: hint,
        };
        assert_eq!(result.is_false_positive(), fp);
        assert_eq!(result.is_window_miss(), miss);
    }

    #[test]
    fn test_hint_from_lookup() {
        assert_eq!(FilterHint::from_lookup(Some(true)), FilterHint::MaybeSeen);
        assert_eq!(FilterHint::from_lookup(Some(false)), FilterHint::Unseen);
        assert_eq!(FilterHint::from_lookup(None), FilterHint::Unavailable);
    }

    #[test]
    fn test_verdict_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Verdict::Duplicate).ok().as_deref(), Some("\"duplicate\""));
    }
}
