//! Cache storage trait with in-memory, SQLite and no-op implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// A cached backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub data: Value,
  /// When the response was stored
  pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(data: Value) -> Self {
    Self {
      data,
      timestamp: Utc::now(),
    }
  }
}

/// Trait for cache storage backends.
///
/// Storage is dumb: it neither knows nor enforces expiry beyond removing
/// entries older than a cutoff on request.
pub trait CacheStorage: Send + Sync {
  /// Get the entry stored under `key`, regardless of age.
  fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

  /// Insert or overwrite the entry under `key`.
  fn set(&self, key: &str, entry: &CacheEntry) -> Result<()>;

  /// Remove every entry with `timestamp <= cutoff`. Returns how many were removed.
  fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

  /// Remove everything.
  fn clear(&self) -> Result<()>;

  /// Number of physically stored entries (expired ones included).
  fn len(&self) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _entry: &CacheEntry) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
    Ok(0)
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }

  fn len(&self) -> Result<usize> {
    Ok(0)
  }
}

/// In-process storage. Lives as long as the middleware.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    Ok(self.entries().get(key).cloned())
  }

  fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
    self.entries().insert(key.to_string(), entry.clone());
    Ok(())
  }

  fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| entry.timestamp > cutoff);
    Ok(before - entries.len())
  }

  fn clear(&self) -> Result<()> {
    self.entries().clear();
    Ok(())
  }

  fn len(&self) -> Result<usize> {
    Ok(self.entries().len())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for the response cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_cache_cached_at
    ON response_cache(cached_at);
"#;

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Private in-memory database, mostly for tests.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

impl CacheStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM response_cache WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry: {}", e))?;

    match row {
      Some((data, cached_at)) => {
        let data: Value = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cache entry: {}", e))?;
        let timestamp = parse_datetime(&cached_at)?;
        Ok(Some(CacheEntry { data, timestamp }))
      }
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data =
      serde_json::to_vec(&entry.data).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (cache_key, data, cached_at) VALUES (?, ?, ?)",
        params![key, data, format_datetime(entry.timestamp)],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Fixed-width RFC 3339 strings compare in chronological order
    conn
      .execute(
        "DELETE FROM response_cache WHERE cached_at <= ?",
        params![format_datetime(cutoff)],
      )
      .map_err(|e| eyre!("Failed to sweep cache: {}", e))
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM response_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    Ok(())
  }

  fn len(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM response_cache", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count cache entries: {}", e))?;

    Ok(usize::try_from(count).unwrap_or_default())
  }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
