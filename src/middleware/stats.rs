//! Request bookkeeping: ids, counters and in-flight records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of a request (in flight or queued).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
  pub fn next() -> Self {
    Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for RequestId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "req-{}", self.0)
  }
}

/// Monotonic request counters.
#[derive(Debug, Default)]
pub struct RequestStats {
  total: AtomicU64,
  successful: AtomicU64,
  failed: AtomicU64,
  cached: AtomicU64,
  /// Completed backend calls and their cumulative duration, for the average
  timed_calls: AtomicU64,
  timed_micros: AtomicU64,
}

impl RequestStats {
  pub fn record_request(&self) {
    self.total.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_success(&self) {
    self.successful.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_failure(&self) {
    self.failed.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_cache_hit(&self) {
    self.cached.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_response_time(&self, elapsed: Duration) {
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    self.timed_calls.fetch_add(1, Ordering::Relaxed);
    self.timed_micros.fetch_add(micros, Ordering::Relaxed);
  }

  /// Reset alongside a cache flush.
  pub fn reset_cached(&self) {
    self.cached.store(0, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      total_requests: self.total.load(Ordering::Relaxed),
      successful_requests: self.successful.load(Ordering::Relaxed),
      failed_requests: self.failed.load(Ordering::Relaxed),
      cached_responses: self.cached.load(Ordering::Relaxed),
    }
  }

  pub fn average_response_time(&self) -> Option<Duration> {
    let calls = self.timed_calls.load(Ordering::Relaxed);
    if calls == 0 {
      return None;
    }
    Some(Duration::from_micros(
      self.timed_micros.load(Ordering::Relaxed) / calls,
    ))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
  pub total_requests: u64,
  pub successful_requests: u64,
  pub failed_requests: u64,
  pub cached_responses: u64,
}

/// A backend call currently in flight.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRequestRecord {
  pub id: RequestId,
  pub started_at: DateTime<Utc>,
  pub function_name: String,
  pub args: Vec<Value>,
  #[serde(skip)]
  started: Instant,
}

impl ActiveRequestRecord {
  pub fn elapsed(&self) -> Duration {
    self.started.elapsed()
  }
}

/// In-flight requests, for diagnostics only.
#[derive(Debug, Default)]
pub struct ActiveRequests {
  records: Mutex<HashMap<RequestId, ActiveRequestRecord>>,
}

impl ActiveRequests {
  fn records(&self) -> MutexGuard<'_, HashMap<RequestId, ActiveRequestRecord>> {
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register a call; the record is removed when the guard drops.
  pub fn begin(&self, function_name: &str, args: &[Value]) -> ActiveGuard<'_> {
    let id = RequestId::next();
    self.records().insert(
      id,
      ActiveRequestRecord {
        id,
        started_at: Utc::now(),
        function_name: function_name.to_string(),
        args: args.to_vec(),
        started: Instant::now(),
      },
    );
    ActiveGuard { active: self, id }
  }

  pub fn len(&self) -> usize {
    self.records().len()
  }

  pub fn is_empty(&self) -> bool {
    self.records().is_empty()
  }

  /// The oldest call still in flight.
  pub fn longest_running(&self) -> Option<ActiveRequestRecord> {
    self
      .records()
      .values()
      .min_by_key(|record| record.started)
      .cloned()
  }

  pub fn any_slower_than(&self, threshold: Duration) -> bool {
    self
      .records()
      .values()
      .any(|record| record.elapsed() > threshold)
  }
}

/// Removes its record from [`ActiveRequests`] on drop, including when the
/// request future is cancelled mid-flight.
pub struct ActiveGuard<'a> {
  active: &'a ActiveRequests,
  id: RequestId,
}

impl ActiveGuard<'_> {
  pub fn id(&self) -> RequestId {
    self.id
  }
}

impl Drop for ActiveGuard<'_> {
  fn drop(&mut self) {
    self.active.records().remove(&self.id);
  }
}

/// Performance and bookkeeping metrics.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
  #[serde(flatten)]
  pub stats: StatsSnapshot,
  pub active_requests: usize,
  pub queued_requests: usize,
  pub cache_size: usize,
  pub longest_running_request: Option<ActiveRequestRecord>,
  /// Mean duration of completed backend calls
  pub average_response_time_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_request_ids_are_unique() {
    let a = RequestId::next();
    let b = RequestId::next();
    assert_ne!(a, b);
    assert_eq!(RequestId(12).to_string(), "req-12");
  }

  #[test]
  fn test_counters_and_reset() {
    let stats = RequestStats::default();
    stats.record_request();
    stats.record_request();
    stats.record_success();
    stats.record_failure();
    stats.record_cache_hit();

    assert_eq!(
      stats.snapshot(),
      StatsSnapshot {
        total_requests: 2,
        successful_requests: 1,
        failed_requests: 1,
        cached_responses: 1,
      }
    );

    stats.reset_cached();
    assert_eq!(stats.snapshot().cached_responses, 0);
    assert_eq!(stats.snapshot().total_requests, 2);
  }

  #[test]
  fn test_average_response_time() {
    let stats = RequestStats::default();
    assert_eq!(stats.average_response_time(), None);

    stats.record_response_time(Duration::from_millis(100));
    stats.record_response_time(Duration::from_millis(300));
    assert_eq!(stats.average_response_time(), Some(Duration::from_millis(200)));
  }

  #[test]
  fn test_guard_removes_record() {
    let active = ActiveRequests::default();
    let first = active.begin("fetch_health_data", &[json!({"days": 7})]);
    std::thread::sleep(Duration::from_millis(2));
    let second = active.begin("get_prediction", &[]);
    assert_eq!(active.len(), 2);

    let longest = active.longest_running().unwrap();
    assert_eq!(longest.id, first.id());
    assert_eq!(longest.function_name, "fetch_health_data");
    assert!(active.any_slower_than(Duration::from_millis(1)));
    assert!(!active.any_slower_than(Duration::from_secs(60)));

    drop(first);
    assert_eq!(active.len(), 1);
    assert_eq!(active.longest_running().unwrap().id, second.id());

    drop(second);
    assert!(active.is_empty());
  }
}
