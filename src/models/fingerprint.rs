//! Content fingerprints.
//!
//! A fingerprint is the deterministic short identifier used for duplicate
//! detection. Pictures sent to the official account arrive as CDN URLs whose
//! path already embeds the media hash, so the usual source is
//! [`Fingerprint::from_image_url`]; [`Fingerprint::of_bytes`] covers content
//! that has to be hashed locally.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum fingerprint length, matching the `records.fingerprint` column.
pub const MAX_FINGERPRINT_LENGTH: usize = 250;

/// Number of `/`-separated tokens in a WeChat CDN picture URL.
///
/// `https://mmbiz.qpic.cn/sz_mmbiz_jpg/<hash>/0` splits into
/// `["https:", "", "mmbiz.qpic.cn", "sz_mmbiz_jpg", "<hash>", "0"]`.
const IMAGE_URL_TOKENS: usize = 6;
const IMAGE_URL_HASH_INDEX: usize = 4;

/// Deterministic identifier derived from content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses and validates a fingerprint.
    ///
    /// Accepted: 1 to [`MAX_FINGERPRINT_LENGTH`] characters from
    /// `[A-Za-z0-9_-]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty, overlong or non-URL-safe input.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidInput("fingerprint is empty".to_string()));
        }
        if value.len() > MAX_FINGERPRINT_LENGTH {
            return Err(Error::InvalidInput(format!(
                "fingerprint exceeds {MAX_FINGERPRINT_LENGTH} characters"
            )));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(Error::InvalidInput(format!(
                "fingerprint contains invalid character {bad:?}"
            )));
        }
        Ok(Self(value))
    }

    /// Fingerprints raw content as lowercase SHA-256 hex (64 characters).
    #[must_use]
    pub fn of_bytes(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hex::encode(hasher.finalize()))
    }

    /// Extracts the media hash embedded in a WeChat CDN picture URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the URL does not have the CDN shape
    /// or the embedded segment is not a valid fingerprint.
    pub fn from_image_url(url: &str) -> Result<Self> {
        let tokens: Vec<&str> = url.split('/').collect();
        if tokens.len() != IMAGE_URL_TOKENS {
            return Err(Error::InvalidInput(format!(
                "can not extract fingerprint from url: {url}"
            )));
        }
        Self::parse(tokens[IMAGE_URL_HASH_INDEX])
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}
