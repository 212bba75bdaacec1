//! Duplicate detection for inbound content.
//!
//! Two tiers:
//! 1. **Membership filter**: in-memory Bloom filter seeded from a recent
//!    window of the store, updated after each successful classification
//! 2. **Conditional insert**: the store's atomic insert-if-absent, which
//!    alone decides the verdict
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 DeduplicationEngine                  │
//! │  ┌──────────────────┐      ┌──────────────────────┐  │
//! │  │ MembershipFilter │      │ ContentStore         │  │
//! │  │                  │ hint │                      │  │
//! │  │ m bits, k hashes │ ───▶ │ insert-if-absent     │  │
//! │  │ (4 week window)  │      │ (system of record)   │  │
//! │  └──────────────────┘      └──────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```

mod config;
mod engine;
mod filter;
mod types;

pub use config::DeduplicationConfig;
pub use engine::DeduplicationEngine;
pub use filter::MembershipFilter;
pub use types::{Classification, FilterHint, Verdict};
