//! Storage collaborator traits.

mod content;
mod credential;
mod identity;

pub use content::ContentStore;
pub use credential::CredentialStateStore;
pub use identity::IdentityStore;
