//! Upstream credential fetchers.

use super::config::CredentialConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Longest validity accepted from upstream, 30 days.
pub const MAX_EXPIRES_IN_SECS: i64 = 30 * 24 * 60 * 60;

/// A freshly issued token and its validity in seconds.
pub struct FetchedToken {
    /// The access token.
    pub access_token: SecretString,
    /// Validity window in seconds, in `1..=MAX_EXPIRES_IN_SECS` when parsed.
    pub expires_in_secs: i64,
}

impl std::fmt::Debug for FetchedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedToken")
            .field("access_token", &"***REDACTED***")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

/// One network call to the upstream authority.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    /// Fetches a new token.
    async fn fetch(&self) -> Result<FetchedToken>;
}

/// Fetches tokens with the client-credential grant over HTTPS.
///
/// `GET {endpoint}?grant_type=client_credential&appid=..&secret=..` answers
/// either `{"access_token": "...", "expires_in": 7200}` or
/// `{"errcode": 40013, "errmsg": "invalid appid"}`.
pub struct HttpCredentialFetcher {
    client: reqwest::Client,
    endpoint: String,
    app_id: String,
    app_secret: SecretString,
}

impl HttpCredentialFetcher {
    /// Creates a fetcher from configuration.
    #[must_use]
    pub fn new(config: &CredentialConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("wechat-dedup/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: config.token_endpoint.clone(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
        }
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch(&self) -> Result<FetchedToken> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| Error::operation("fetch_token", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::operation("fetch_token", format!("HTTP {status}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::operation("fetch_token", e.without_url()))?;
        parse_token_response(&body)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    errcode: i64,
    errmsg: Option<String>,
}

/// Decodes a token endpoint response body.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] for malformed JSON, a non-zero
/// `errcode`, a missing token, or an `expires_in` outside
/// `1..=`[`MAX_EXPIRES_IN_SECS`].
pub fn parse_token_response(body: &[u8]) -> Result<FetchedToken> {
    let response: TokenResponse =
        serde_json::from_slice(body).map_err(|e| Error::operation("fetch_token", e))?;

    if response.errcode != 0 {
        return Err(Error::operation(
            "fetch_token",
            format!(
                "errcode {}: {}",
                response.errcode,
                response.errmsg.unwrap_or_default()
            ),
        ));
    }
    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::operation("fetch_token", "response has no access_token"))?;
    let expires_in_secs = response
        .expires_in
        .ok_or_else(|| Error::operation("fetch_token", "response has no expires_in"))?;
    if !(1..=MAX_EXPIRES_IN_SECS).contains(&expires_in_secs) {
        return Err(Error::operation(
            "fetch_token",
            format!("expires_in {expires_in_secs}s is outside 1..={MAX_EXPIRES_IN_SECS}"),
        ));
    }

    Ok(FetchedToken {
        access_token: SecretString::from(access_token),
        expires_in_secs,
    })
}
