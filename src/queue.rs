//! Offline request queue.
//!
//! Calls made while offline are parked here in FIFO order and replayed by
//! the middleware once connectivity returns. The queue is the only owner of
//! queued requests; replay takes them out with [`OfflineQueue::take_all`]
//! and hands failures back through [`OfflineQueue::settle_failure`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::backend::BackendFn;
use crate::error::ApiError;
use crate::middleware::{RequestId, RequestOptions};

/// A backend call deferred while offline.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
  pub id: RequestId,
  pub backend: BackendFn,
  pub args: Vec<Value>,
  /// Failed replay attempts so far
  pub retries: u32,
  pub created_at: DateTime<Utc>,
  pub last_attempt_at: Option<DateTime<Utc>>,
  pub description: String,
  pub options: RequestOptions,
}

impl QueuedRequest {
  pub fn new(id: RequestId, backend: BackendFn, args: Vec<Value>, options: RequestOptions) -> Self {
    let description = options
      .description
      .clone()
      .unwrap_or_else(|| format!("{} request", backend.name()));
    Self {
      id,
      backend,
      args,
      retries: 0,
      created_at: Utc::now(),
      last_attempt_at: None,
      description,
      options,
    }
  }

  /// Lightweight view for display and diagnostics.
  pub fn summary(&self) -> QueuedSummary {
    QueuedSummary {
      id: self.id,
      function_name: self.backend.name().to_string(),
      description: self.description.clone(),
      retries: self.retries,
      created_at: self.created_at,
      last_attempt_at: self.last_attempt_at,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedSummary {
  pub id: RequestId,
  pub function_name: String,
  pub description: String,
  pub retries: u32,
  pub created_at: DateTime<Utc>,
  pub last_attempt_at: Option<DateTime<Utc>>,
}

/// What happened to one queued request during a drain.
#[derive(Debug, Clone)]
pub enum ReplayOutcome {
  /// Replay succeeded; the request is gone from the queue
  Completed {
    id: RequestId,
    description: String,
    value: Value,
  },
  /// Replay failed and the request went back to the end of the queue
  Requeued {
    id: RequestId,
    description: String,
    retries: u32,
    error: ApiError,
  },
  /// Replay failed for the last allowed time; the request was dropped
  Dropped {
    id: RequestId,
    description: String,
    error: ApiError,
  },
}

impl ReplayOutcome {
  pub fn id(&self) -> RequestId {
    match self {
      Self::Completed { id, .. } | Self::Requeued { id, .. } | Self::Dropped { id, .. } => *id,
    }
  }

  pub fn is_completed(&self) -> bool {
    matches!(self, Self::Completed { .. })
  }
}

/// FIFO queue of deferred requests with bounded replay attempts.
pub struct OfflineQueue {
  items: Mutex<VecDeque<QueuedRequest>>,
  /// Replay attempts allowed per request
  max_retries: u32,
}

impl OfflineQueue {
  pub fn new(max_retries: u32) -> Self {
    Self {
      items: Mutex::new(VecDeque::new()),
      max_retries: max_retries.max(1),
    }
  }

  fn items(&self) -> MutexGuard<'_, VecDeque<QueuedRequest>> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Append a request. Returns the new queue length.
  pub fn enqueue(&self, item: QueuedRequest) -> usize {
    let mut items = self.items();
    debug!(id = %item.id, description = %item.description, "queued request");
    items.push_back(item);
    items.len()
  }

  /// Remove and return everything currently queued, oldest first.
  ///
  /// Snapshot and clear happen under one lock, so a request is handed to
  /// exactly one drain and anything enqueued afterwards waits for the next.
  pub fn take_all(&self) -> Vec<QueuedRequest> {
    self.items().drain(..).collect()
  }

  /// Decide the fate of a request whose replay just failed.
  ///
  /// The failed attempt counts towards `max_retries`. While attempts remain,
  /// the request is appended again with `retries` bumped; otherwise it is
  /// dropped for good.
  pub fn settle_failure(&self, mut item: QueuedRequest, error: ApiError) -> ReplayOutcome {
    let attempts = item.retries + 1;
    if attempts < self.max_retries {
      item.retries = attempts;
      item.last_attempt_at = Some(Utc::now());
      let outcome = ReplayOutcome::Requeued {
        id: item.id,
        description: item.description.clone(),
        retries: item.retries,
        error,
      };
      self.items().push_back(item);
      outcome
    } else {
      warn!(
        id = %item.id,
        description = %item.description,
        attempts,
        "queued request exceeded max retries and was dropped"
      );
      ReplayOutcome::Dropped {
        id: item.id,
        description: item.description,
        error,
      }
    }
  }

  pub fn len(&self) -> usize {
    self.items().len()
  }

  pub fn is_empty(&self) -> bool {
    self.items().is_empty()
  }

  /// Summaries of queued requests, oldest first.
  pub fn pending(&self) -> Vec<QueuedSummary> {
    self.items().iter().map(QueuedRequest::summary).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn request(id: u64, args: Vec<Value>) -> QueuedRequest {
    let backend = BackendFn::new("submit_symptom", |_| async { Ok(Value::Null) });
    QueuedRequest::new(RequestId(id), backend, args, RequestOptions::default())
  }

  fn failure() -> ApiError {
    ApiError::from_backend(crate::error::BackendError::new("HTTP 500"), None, true)
  }

  #[test]
  fn test_take_all_is_fifo_and_clears() {
    let queue = OfflineQueue::new(3);
    assert_eq!(queue.enqueue(request(1, vec![])), 1);
    assert_eq!(queue.enqueue(request(2, vec![])), 2);
    assert_eq!(queue.enqueue(request(3, vec![])), 3);

    let ids: Vec<_> = queue.take_all().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![RequestId(1), RequestId(2), RequestId(3)]);
    assert!(queue.is_empty());
    assert!(queue.take_all().is_empty());
  }

  #[test]
  fn test_settle_failure_requeues_then_drops() {
    let queue = OfflineQueue::new(3);
    let mut item = request(1, vec![]);

    for expected in 1..=2 {
      match queue.settle_failure(item, failure()) {
        ReplayOutcome::Requeued { retries, .. } => assert_eq!(retries, expected),
        other => panic!("expected requeue, got {:?}", other),
      }
      let mut taken = queue.take_all();
      assert_eq!(taken.len(), 1);
      item = taken.remove(0);
      assert_eq!(item.retries, expected);
      assert!(item.last_attempt_at.is_some());
    }

    // Third failed attempt exhausts the budget
    let outcome = queue.settle_failure(item, failure());
    assert!(matches!(outcome, ReplayOutcome::Dropped { .. }));
    assert!(queue.is_empty());
  }

  #[test]
  fn test_requeue_goes_behind_newer_items() {
    let queue = OfflineQueue::new(3);
    queue.enqueue(request(2, vec![]));
    queue.settle_failure(request(1, vec![]), failure());

    let ids: Vec<_> = queue.pending().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![RequestId(2), RequestId(1)]);
  }

  #[test]
  fn test_description_never_comes_from_args() {
    // Arguments may carry secrets such as OAuth codes
    let auth = BackendFn::new("authenticate_google_fit", |_| async { Ok(Value::Null) });
    let item = QueuedRequest::new(
      RequestId(1),
      auth,
      vec![json!("4/0AfJohXn-secret-code")],
      RequestOptions::default(),
    );
    assert_eq!(item.description, "authenticate_google_fit request");
    assert!(!item.summary().description.contains("secret"));

    let options = RequestOptions::new().with_description("Log headache");
    let backend = BackendFn::new("submit_symptom", |_| async { Ok(Value::Null) });
    let item = QueuedRequest::new(RequestId(2), backend, vec![json!({})], options);
    assert_eq!(item.description, "Log headache");
  }
}
