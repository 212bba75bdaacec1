//! `SQLite` storage backend.
//!
//! ## Module Structure
//!
//! - `connection`: Lock acquisition with poison recovery and connection pragmas
//! - `rows`: Row decoding for records and identities
//! - `metrics`: Shared metrics recording helpers
//! - `store`: [`SqliteStore`], implementing the content and identity stores
//!
//! WAL mode lets report queries run while a conditional insert holds the
//! write lock.

mod connection;
mod metrics;
mod rows;
mod store;

pub use connection::{acquire_lock, configure_connection};
pub use store::SqliteStore;
