//! Probabilistic membership filter.
//!
//! A Bloom filter over fingerprints: an `m`-bit array and `k` hash functions,
//! sized from a target capacity and false-positive rate. It can report
//! "maybe seen" for an unseen fingerprint but never "unseen" for one that
//! was inserted.

use crate::models::Fingerprint;
use sha2::{Digest, Sha256};
use std::sync::Mutex;

const WORD_BITS: u64 = 64;

struct FilterState {
    words: Vec<u64>,
    inserted: usize,
}

/// Bloom filter over [`Fingerprint`]s.
///
/// # Index Derivation
///
/// The `k` bit positions come from double hashing over one SHA-256 digest:
/// `h1` and `h2` are the first two little-endian `u64` words of the digest
/// (`h2` forced odd) and position `i` is `(h1 + i * h2) mod m`.
///
/// # Thread Safety
///
/// Adding an element mutates shared bits, so the bit array sits behind a
/// `Mutex`. A poisoned lock makes the filter unavailable:
/// [`contains`](Self::contains) returns `None` and
/// [`insert`](Self::insert) returns `false`. Callers fall back to the store.
///
/// # Example
///
/// ```rust
/// use wechat_dedup::{Fingerprint, MembershipFilter};
///
/// let filter = MembershipFilter::with_estimates(1000, 0.01);
/// let fp = Fingerprint::parse("abc123").unwrap();
///
/// assert_eq!(filter.contains(&fp), Some(false));
/// filter.insert(&fp);
/// assert_eq!(filter.contains(&fp), Some(true));
/// ```
pub struct MembershipFilter {
    state: Mutex<FilterState>,
    bit_len: u64,
    hash_count: u32,
}

impl MembershipFilter {
    /// Sizes a filter for `capacity` elements at `error_rate` false positives.
    ///
    /// `m = ceil(-n ln p / (ln 2)^2)` and `k = max(1, round(m / n * ln 2))`.
    /// A zero capacity is treated as one; the error rate is clamped into
    /// `(0, 1)`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn with_estimates(capacity: usize, error_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = error_rate.clamp(f64::MIN_POSITIVE, 0.999_999);
        let ln2 = std::f64::consts::LN_2;

        let bit_len = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(1.0) as u64;
        let hash_count = ((bit_len as f64 / n) * ln2).round().max(1.0) as u32;
        let word_count = bit_len.div_ceil(WORD_BITS) as usize;

        Self {
            state: Mutex::new(FilterState {
                words: vec![0; word_count],
                inserted: 0,
            }),
            bit_len,
            hash_count,
        }
    }

    /// Number of bits `m`.
    #[must_use]
    pub const fn bit_len(&self) -> u64 {
        self.bit_len
    }

    /// Number of hash functions `k`.
    #[must_use]
    pub const fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Number of insertions so far, repeats included. Zero if unavailable.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |s| s.inserted)
    }

    /// Returns `true` if nothing was inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `Some(true)` if `fingerprint` may have been inserted,
    /// `Some(false)` if it definitely was not, `None` if unavailable.
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> Option<bool> {
        let positions = self.positions(fingerprint);
        let state = self.state.lock().ok()?;
        Some(positions.iter().all(|&bit| {
            let (word, mask) = locate(bit);
            state.words[word] & mask != 0
        }))
    }

    /// Adds `fingerprint`. Returns `false` if the filter is unavailable.
    pub fn insert(&self, fingerprint: &Fingerprint) -> bool {
        let positions = self.positions(fingerprint);
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        for bit in positions {
            let (word, mask) = locate(bit);
            state.words[word] |= mask;
        }
        state.inserted += 1;
        true
    }

    fn positions(&self, fingerprint: &Fingerprint) -> Vec<u64> {
        let digest = Sha256::digest(fingerprint.as_str().as_bytes());
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        second.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_le_bytes(first);
        let h2 = u64::from_le_bytes(second) | 1;

        (0..u64::from(self.hash_count))
            .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % self.bit_len)
            .collect()
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn locate(bit: u64) -> (usize, u64) {
    ((bit / WORD_BITS) as usize, 1 << (bit % WORD_BITS))
}

impl std::fmt::Debug for MembershipFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipFilter")
            .field("bit_len", &self.bit_len)
            .field("hash_count", &self.hash_count)
            .field("inserted", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use test_case::test_case;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::parse(s).unwrap()
    }

    #[test_case(1000, 0.01, 9586, 7 ; "original sizing")]
    #[test_case(100, 0.1, 480, 3 ; "loose")]
    #[test_case(0, 0.01, 10, 7 ; "zero capacity")]
    fn test_sizing(capacity: usize, rate: f64, bits: u64, hashes: u32) {
        let filter = MembershipFilter::with_estimates(capacity, rate);
        assert_eq!(filter.bit_len(), bits);
        assert_eq!(filter.hash_count(), hashes);
    }

    #[test]
    fn test_insert_then_contains() {
        let filter = MembershipFilter::with_estimates(100, 0.01);
        assert!(filter.is_empty());
        assert_eq!(filter.contains(&fp("abc123")), Some(false));

        assert!(filter.insert(&fp("abc123")));
        assert!(filter.insert(&fp("abc123")));

        assert_eq!(filter.contains(&fp("abc123")), Some(true));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_false_positive_rate_near_target() {
        let filter = MembershipFilter::with_estimates(1000, 0.01);
        for i in 0..1000 {
            filter.insert(&fp(&format!("seen-{i}")));
        }
        let false_positives = (0..10_000)
            .filter(|i| filter.contains(&fp(&format!("unseen-{i}"))) == Some(true))
            .count();
        // 1% target; allow generous slack for a fixed sample.
        assert!(false_positives < 300, "false positives: {false_positives}");
    }

    #[test]
    fn test_poisoned_filter_is_unavailable() {
        let filter = std::sync::Arc::new(MembershipFilter::with_estimates(10, 0.01));
        let clone = std::sync::Arc::clone(&filter);
        let _ = std::thread::spawn(move || {
            let _guard = clone.state.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert_eq!(filter.contains(&fp("abc")), None);
        assert!(!filter.insert(&fp("abc")));
        assert_eq!(filter.len(), 0);
    }
}
