//! Response cache for backend calls.
//!
//! - Keys are structural fingerprints of (function name, arguments)
//! - Entries expire after a fixed window and are swept lazily
//! - Storage is pluggable: in-memory, SQLite or disabled

mod fingerprint;
mod storage;
mod store;

pub use fingerprint::fingerprint;
pub use storage::{CacheEntry, CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use store::CacheStore;
