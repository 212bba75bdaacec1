//! Property-based tests.
//!
//! Uses proptest to verify invariants across random inputs:
//! - The membership filter never reports a false negative
//! - Fingerprint parsing accepts exactly the URL-safe alphabet
//! - Record status ordering matches the storage codes
//! - Retry delays never decrease and never exceed the cap

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use wechat_dedup::models::MAX_FINGERPRINT_LENGTH;
use wechat_dedup::{CredentialConfig, Fingerprint, IdentityKey, MembershipFilter, RecordStatus};

fn status() -> impl Strategy<Value = RecordStatus> {
    prop::sample::select(RecordStatus::ALL.to_vec())
}

proptest! {
    /// Property: every inserted fingerprint is reported as possibly present.
    #[test]
    fn prop_filter_has_no_false_negatives(
        keys in prop::collection::hash_set("[A-Za-z0-9_-]{1,64}", 1..300),
        capacity in 1usize..500,
        error_rate in 0.001f64..0.5,
    ) {
        let filter = MembershipFilter::with_estimates(capacity, error_rate);
        let fingerprints: Vec<Fingerprint> = keys
            .into_iter()
            .map(|k| Fingerprint::parse(k).unwrap())
            .collect();
        for fp in &fingerprints {
            prop_assert!(filter.insert(fp));
        }
        for fp in &fingerprints {
            prop_assert_eq!(filter.contains(fp), Some(true));
        }
        prop_assert_eq!(filter.len(), fingerprints.len());
    }

    /// Property: filter sizing grows with capacity and always uses at least one hash.
    #[test]
    fn prop_filter_sizing_is_monotonic(capacity in 1usize..100_000, error_rate in 0.0001f64..0.5) {
        let small = MembershipFilter::with_estimates(capacity, error_rate);
        let large = MembershipFilter::with_estimates(capacity * 2, error_rate);
        prop_assert!(small.hash_count() >= 1);
        prop_assert!(large.bit_len() >= small.bit_len());
    }

    /// Property: valid fingerprints parse and keep their exact text.
    #[test]
    fn prop_fingerprint_accepts_url_safe_text(s in "[A-Za-z0-9_-]{1,250}") {
        let fp = Fingerprint::parse(s.clone()).unwrap();
        prop_assert_eq!(fp.as_str(), s.as_str());
    }

    /// Property: any character outside the alphabet is rejected.
    #[test]
    fn prop_fingerprint_rejects_other_characters(
        prefix in "[a-z]{0,10}",
        bad in "[ ./:?#%&=+\u{4e00}-\u{4e10}]",
        suffix in "[a-z]{0,10}",
    ) {
        let candidate = format!("{prefix}{bad}{suffix}");
        prop_assert!(Fingerprint::parse(candidate).is_err());
    }

    /// Property: fingerprints longer than the column width are rejected.
    #[test]
    fn prop_fingerprint_rejects_overlong(extra in 1usize..50) {
        let candidate = "a".repeat(MAX_FINGERPRINT_LENGTH + extra);
        prop_assert!(Fingerprint::parse(candidate).is_err());
    }

    /// Property: image URLs yield the hash segment.
    #[test]
    fn prop_image_url_extracts_hash(hash in "[A-Za-z0-9_-]{1,80}", n in 0u8..10) {
        let url = format!("https://mmbiz.qpic.cn/sz_mmbiz_jpg/{hash}/{n}");
        let fp = Fingerprint::from_image_url(&url).unwrap();
        prop_assert_eq!(fp.as_str(), hash.as_str());
    }

    /// Property: content hashing is deterministic and always 64 hex characters.
    #[test]
    fn prop_of_bytes_is_stable(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let a = Fingerprint::of_bytes(&bytes);
        let b = Fingerprint::of_bytes(&bytes);
        prop_assert_eq!(a.as_str().len(), 64);
        prop_assert_eq!(a, b);
    }

    /// Property: status ordering agrees with the storage code ordering.
    #[test]
    fn prop_status_order_matches_codes(a in status(), b in status()) {
        prop_assert_eq!(a.cmp(&b), a.code().cmp(&b.code()));
        prop_assert_eq!(RecordStatus::from_code(a.code()), Some(a));
        prop_assert_eq!(a.as_str().parse::<RecordStatus>().unwrap(), a);
    }

    /// Property: identity keys are stored trimmed.
    #[test]
    fn prop_identity_key_is_trimmed(core in "[A-Za-z0-9_]{1,40}", pad in " {0,5}") {
        let key = IdentityKey::new(format!("{pad}{core}{pad}")).unwrap();
        prop_assert_eq!(key.as_str(), core.as_str());
    }

    /// Property: retry delays are non-decreasing and capped.
    #[test]
    fn prop_backoff_is_monotonic_and_capped(base in 1u64..30, extra in 0u64..300, attempts in 1u32..40) {
        let config = CredentialConfig::default().with_backoff(base, base + extra);
        let mut previous = std::time::Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = config.backoff_delay(attempt);
            prop_assert!(delay >= previous);
            prop_assert!(delay.as_secs() <= base + extra);
            previous = delay;
        }
    }
}
