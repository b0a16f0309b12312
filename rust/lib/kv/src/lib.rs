//! Durable local storage for the console.
//!
//! Plays the role browser `localStorage` plays for a web dashboard: a flat,
//! string-keyed namespace (`token`, `user`, `permissions`, `darkMode`, ...)
//! that survives restarts. [`RedbStore`] is the on-disk backend,
//! [`MemoryStore`] an ephemeral one for tests and throwaway sessions.

pub mod error;
pub mod memory;
pub mod redb;
pub mod traits;

pub use error::KVError;
pub use memory::MemoryStore;
pub use redb::RedbStore;
pub use traits::KVStore;
