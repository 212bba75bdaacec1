//! Access-token lifecycle.
//!
//! [`CredentialManager`] holds one token, refreshes it ahead of expiry from a
//! [`CredentialFetcher`], mirrors it through a
//! [`CredentialStateStore`](crate::storage::CredentialStateStore) for restart
//! recovery, and keeps retrying through upstream outages.

mod clock;
mod config;
mod fetcher;
mod manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CredentialConfig, DEFAULT_TOKEN_ENDPOINT, MIN_REFRESH_DELAY};
pub use fetcher::{
    CredentialFetcher, FetchedToken, HttpCredentialFetcher, MAX_EXPIRES_IN_SECS, parse_token_response,
};
pub use manager::{CredentialManager, ManagerState};
