//! The request executor and the state it shares with the rest of the app.
//!
//! [`ApiMiddleware`] wraps every backend call with:
//! - loading tracking and transient error/success notices
//! - response caching keyed by call fingerprint
//! - offline queueing with replay once connectivity returns
//! - request statistics and in-flight diagnostics
//!
//! State lives behind an `Arc` with one lock per store, and no lock is held
//! across an `.await`, so clones can be used freely from any task.

mod connectivity;
mod options;
mod state;
mod stats;

use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::BackendFn;
use crate::cache::{fingerprint, CacheStorage, CacheStore, MemoryStorage};
use crate::config::MiddlewareConfig;
use crate::error::{ApiError, BackendError, ErrorKind};
use crate::network::{ConnectivityState, NetworkMonitor};
use crate::queue::{OfflineQueue, QueuedRequest, QueuedSummary};

use self::stats::{ActiveRequests, RequestStats};

pub use options::RequestOptions;
pub use state::{ApiState, ConnectionWarning, ErrorNotice, SuccessNotice};
pub use stats::{ActiveRequestRecord, Metrics, RequestId, StatsSnapshot};

const BACK_ONLINE_MESSAGE: &str = "You are back online";

/// Client-side API middleware.
///
/// Cheap to clone; all clones share the same cache, queue and state.
#[derive(Clone)]
pub struct ApiMiddleware {
  inner: Arc<Inner>,
}

struct Inner {
  config: MiddlewareConfig,
  cache: CacheStore,
  queue: OfflineQueue,
  network: NetworkMonitor,
  stats: RequestStats,
  active: ActiveRequests,
  /// Backend function used for connectivity probes
  health: BackendFn,
  state: watch::Sender<ApiState>,
  /// Calls currently holding the loading flag
  loading: AtomicUsize,
}

impl ApiMiddleware {
  /// Create a middleware with an in-memory cache.
  pub fn new(config: MiddlewareConfig, health: BackendFn) -> Self {
    Self::with_storage(config, health, Arc::new(MemoryStorage::new()))
  }

  /// Create a middleware on top of the given cache storage.
  pub fn with_storage(
    config: MiddlewareConfig,
    health: BackendFn,
    storage: Arc<dyn CacheStorage>,
  ) -> Self {
    let (state, _) = watch::channel(ApiState::default());

    Self {
      inner: Arc::new(Inner {
        cache: CacheStore::new(storage, config.cache_expiry()),
        queue: OfflineQueue::new(config.max_retries),
        network: NetworkMonitor::new(config.max_reconnect_attempts),
        stats: RequestStats::default(),
        active: ActiveRequests::default(),
        health,
        state,
        loading: AtomicUsize::new(0),
        config,
      }),
    }
  }

  /// Execute `backend(args)` with default options.
  pub async fn call(&self, backend: &BackendFn, args: Vec<Value>) -> Result<Value, ApiError> {
    self.execute(backend, args, RequestOptions::default()).await
  }

  /// Execute a backend call through the middleware.
  ///
  /// While offline (and unless `skip_queue` is set) the call is queued for
  /// replay and this returns an [`ErrorKind::Queued`] error without
  /// touching the backend. Otherwise a fresh cached response is returned
  /// when available, and the backend is invoked on a miss.
  ///
  /// Every failure is returned to the caller. Queued deferrals are neither
  /// surfaced as an error notice nor counted as failures.
  pub async fn execute(
    &self,
    backend: &BackendFn,
    args: Vec<Value>,
    options: RequestOptions,
  ) -> Result<Value, ApiError> {
    let inner = &self.inner;
    inner.stats.record_request();

    let _loading = (!options.skip_loading).then(|| LoadingGuard::new(self));

    if inner.network.is_offline() && !options.skip_queue {
      let id = RequestId::next();
      info!(%id, function = backend.name(), "offline, queueing request");
      let pending = inner
        .queue
        .enqueue(QueuedRequest::new(id, backend.clone(), args, options));
      self.publish(|state| state.pending_requests = pending);
      return Err(ApiError::queued(id));
    }

    let cache_key = (!options.skip_cache).then(|| {
      options
        .cache_key
        .clone()
        .unwrap_or_else(|| fingerprint(backend.name(), &args))
    });

    if let Some(key) = &cache_key {
      if let Some(hit) = inner.cache.get(key) {
        debug!(function = backend.name(), "cache hit");
        // A hit is a successful call that never reached the backend
        inner.stats.record_cache_hit();
        inner.stats.record_success();
        return Ok(hit);
      }
      inner.cache.sweep_expired();
    }

    let started = Instant::now();
    let outcome = {
      let _active = inner.active.begin(backend.name(), &args);
      backend.call(args).await
    };
    inner.stats.record_response_time(started.elapsed());

    match outcome {
      Ok(value) => {
        if let Some(key) = &cache_key {
          inner.cache.set(key, value.clone());
        }
        inner.stats.record_success();
        self.publish(|state| state.api_retries = 0);
        if options.show_success_message {
          self.notify_success(options.success_text());
        }
        Ok(value)
      }
      Err(err) => Err(self.fail(backend, err, &options)),
    }
  }

  /// Classify a backend failure and apply its side effects.
  fn fail(&self, backend: &BackendFn, err: BackendError, options: &RequestOptions) -> ApiError {
    let error = ApiError::from_backend(
      err,
      options.custom_error_msg.as_deref(),
      !options.skip_retry,
    );

    match error.kind {
      ErrorKind::Queued => {
        debug!(function = backend.name(), "backend deferred the request");
        return error;
      }
      ErrorKind::Network => {
        self.inner.network.go_offline();
        self.publish(|state| {
          state.offline = true;
          state.api_retries = state.api_retries.saturating_add(1);
        });
      }
      _ => {}
    }

    warn!(
      function = backend.name(),
      kind = %error.kind,
      detail = %error.detail,
      "request failed"
    );
    self.notify_error(&error);
    self.inner.stats.record_failure();
    error
  }

  /// Current observable state.
  pub fn state(&self) -> ApiState {
    self.inner.state.borrow().clone()
  }

  /// Receive every state change.
  pub fn subscribe(&self) -> watch::Receiver<ApiState> {
    self.inner.state.subscribe()
  }

  pub fn is_offline(&self) -> bool {
    self.inner.network.is_offline()
  }

  pub fn connectivity(&self) -> ConnectivityState {
    self.inner.network.snapshot()
  }

  /// Queued requests, oldest first.
  pub fn pending_requests(&self) -> Vec<QueuedSummary> {
    self.inner.queue.pending()
  }

  pub fn metrics(&self) -> Metrics {
    let inner = &self.inner;
    Metrics {
      stats: inner.stats.snapshot(),
      active_requests: inner.active.len(),
      queued_requests: inner.queue.len(),
      cache_size: inner.cache.len(),
      longest_running_request: inner.active.longest_running(),
      average_response_time_ms: inner
        .stats
        .average_response_time()
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
    }
  }

  /// Whether any in-flight call has been running for longer than the
  /// configured slow-request threshold.
  pub fn has_slow_requests(&self) -> bool {
    self
      .inner
      .active
      .any_slower_than(self.inner.config.slow_request())
  }

  /// Drop every cached response and reset the cache-hit counter.
  pub fn clear_cache(&self) {
    self.inner.cache.clear();
    self.inner.stats.reset_cached();
    info!("response cache cleared");
  }

  pub fn clear_error(&self) {
    self.publish(|state| state.error = None);
  }

  pub fn dismiss_success(&self) {
    self.publish(|state| state.success = None);
  }

  fn publish(&self, update: impl FnOnce(&mut ApiState)) {
    self.inner.state.send_if_modified(|state| {
      let before = state.clone();
      update(state);
      *state != before
    });
  }

  fn publish_pending(&self) {
    let pending = self.inner.queue.len();
    self.publish(|state| state.pending_requests = pending);
  }

  fn notify_error(&self, error: &ApiError) {
    let notice = ErrorNotice {
      message: error.message.clone(),
      timestamp: Utc::now(),
      code: error.code.clone(),
      retryable: error.retryable,
    };
    let shown = notice.clone();
    self.publish(|state| state.error = Some(notice));

    let this = self.clone();
    let display = self.inner.config.error_display();
    tokio::spawn(async move {
      tokio::time::sleep(display).await;
      // A newer notice keeps its own timer
      this.publish(|state| {
        if state.error.as_ref() == Some(&shown) {
          state.error = None;
        }
      });
    });
  }

  fn notify_success(&self, message: &str) {
    let notice = SuccessNotice {
      message: message.to_string(),
      timestamp: Utc::now(),
    };
    let shown = notice.clone();
    self.publish(|state| state.success = Some(notice));

    let this = self.clone();
    let display = self.inner.config.success_display();
    tokio::spawn(async move {
      tokio::time::sleep(display).await;
      this.publish(|state| {
        if state.success.as_ref() == Some(&shown) {
          state.success = None;
        }
      });
    });
  }
}

/// Holds the loading flag for one call.
struct LoadingGuard<'a> {
  middleware: &'a ApiMiddleware,
}

impl<'a> LoadingGuard<'a> {
  fn new(middleware: &'a ApiMiddleware) -> Self {
    middleware.inner.loading.fetch_add(1, Ordering::SeqCst);
    middleware.sync_loading();
    Self { middleware }
  }
}

impl Drop for LoadingGuard<'_> {
  fn drop(&mut self) {
    self.middleware.inner.loading.fetch_sub(1, Ordering::SeqCst);
    self.middleware.sync_loading();
  }
}

impl ApiMiddleware {
  fn sync_loading(&self) {
    let loading = &self.inner.loading;
    // Read the counter inside the update so the last writer wins
    self.publish(|state| state.is_loading = loading.load(Ordering::SeqCst) > 0);
  }
}
