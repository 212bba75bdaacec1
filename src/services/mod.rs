//! Business logic services.
//!
//! Services own the in-memory coordination state and call storage through
//! the traits in [`crate::storage`].

pub mod coordinator;
pub mod credential;
pub mod deduplication;
pub mod registry;

pub use coordinator::{
    Coordinator, CoordinatorConfig, InboundContent, Outcome, internal_error_message,
};
pub use credential::{
    Clock, CredentialConfig, CredentialFetcher, CredentialManager, HttpCredentialFetcher,
    ManagerState, ManualClock, SystemClock,
};
pub use deduplication::{
    Classification, DeduplicationConfig, DeduplicationEngine, FilterHint, MembershipFilter,
    Verdict,
};
pub use registry::IdentityRegistry;
