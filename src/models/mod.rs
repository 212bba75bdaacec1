//! Data models.
//!
//! Value types shared by the services and the storage collaborators.

mod credential;
mod fingerprint;
mod identity;
mod record;

pub use credential::{Credential, PersistedCredential};
pub use fingerprint::{Fingerprint, MAX_FINGERPRINT_LENGTH};
pub use identity::{Identity, IdentityKey, MAX_IDENTITY_KEY_LENGTH};
pub use record::{
    ContentRecord, MAX_LOCATOR_LENGTH, NewContentRecord, RecordQuery, RecordStatus,
    validate_locator,
};
