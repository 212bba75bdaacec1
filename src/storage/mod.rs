//! Storage layer.
//!
//! Collaborator traits live in [`traits`]; services hold them as
//! `Arc<dyn Trait>` so backends can be swapped:
//!
//! - [`SqliteStore`]: durable records and identities
//! - [`InMemoryStore`]: the same contract without a database, for tests and dry runs
//! - [`FileCredentialStore`]: JSON mirror of the current access token
//! - [`InMemoryCredentialStore`]: the mirror without a file

// Lock guards are held for whole statement scopes.
#![allow(clippy::significant_drop_tightening)]

pub mod credential_file;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use credential_file::FileCredentialStore;
pub use memory::{InMemoryCredentialStore, InMemoryStore};
pub use sqlite::{SqliteStore, acquire_lock};
pub use traits::{ContentStore, CredentialStateStore, IdentityStore};
