//! Expiring response cache on top of a storage backend.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::{CacheEntry, CacheStorage, MemoryStorage};

/// Response cache with a fixed expiry window.
///
/// Entries older than the window are never returned, even while they are
/// still physically stored. They are removed by [`CacheStore::sweep_expired`],
/// which the middleware runs on cache misses rather than on a timer.
///
/// Storage failures are logged and treated as misses so a broken cache
/// never fails a request.
pub struct CacheStore {
  storage: Arc<dyn CacheStorage>,
  /// How long a stored response stays valid
  expiry: Duration,
}

impl CacheStore {
  pub fn new(storage: Arc<dyn CacheStorage>, expiry: Duration) -> Self {
    Self { storage, expiry }
  }

  /// In-memory cache with the given expiry.
  pub fn in_memory(expiry: Duration) -> Self {
    Self::new(Arc::new(MemoryStorage::new()), expiry)
  }

  fn is_expired(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - timestamp >= self.expiry
  }

  /// Look up a fresh response.
  pub fn get(&self, key: &str) -> Option<Value> {
    match self.storage.get(key) {
      Ok(Some(entry)) if !self.is_expired(entry.timestamp, Utc::now()) => Some(entry.data),
      Ok(_) => None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        None
      }
    }
  }

  /// Store (or overwrite) a response, stamped with the current time.
  pub fn set(&self, key: &str, value: Value) {
    self.insert(key, CacheEntry::new(value));
  }

  pub(crate) fn insert(&self, key: &str, entry: CacheEntry) {
    if let Err(e) = self.storage.set(key, &entry) {
      warn!(key, error = %e, "cache write failed");
    }
  }

  /// Remove expired entries. Returns how many were removed.
  pub fn sweep_expired(&self) -> usize {
    let cutoff = Utc::now() - self.expiry;
    match self.storage.remove_older_than(cutoff) {
      Ok(removed) => {
        if removed > 0 {
          debug!(removed, "swept expired cache entries");
        }
        removed
      }
      Err(e) => {
        warn!(error = %e, "cache sweep failed");
        0
      }
    }
  }

  /// Remove every entry.
  pub fn clear(&self) {
    if let Err(e) = self.storage.clear() {
      warn!(error = %e, "cache clear failed");
    }
  }

  /// Number of stored entries, expired ones included until swept.
  pub fn len(&self) -> usize {
    self.storage.len().unwrap_or_else(|e| {
      warn!(error = %e, "cache size lookup failed");
      0
    })
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
