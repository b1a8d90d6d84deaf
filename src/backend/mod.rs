//! Backend functions: the opaque async callables the middleware wraps.

mod client;
pub mod types;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::BackendError;

pub use client::HealthApiClient;

/// Result of a single backend invocation.
pub type BackendResult = Result<Value, BackendError>;

type CallFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, BackendResult> + Send + Sync;

/// A named async backend call.
///
/// The name is the function's identity for cache fingerprinting and
/// diagnostics, so two `BackendFn`s with the same name are treated as the
/// same function.
#[derive(Clone)]
pub struct BackendFn {
  name: Arc<str>,
  call: Arc<CallFn>,
}

impl BackendFn {
  /// Wrap an async closure as a backend function.
  ///
  /// ```ignore
  /// let echo = BackendFn::new("echo", |args| async move {
  ///   Ok(serde_json::Value::Array(args))
  /// });
  /// ```
  pub fn new<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
  where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BackendResult> + Send + 'static,
  {
    let call: Arc<CallFn> = Arc::new(move |args: Vec<Value>| f(args).boxed());
    Self {
      name: name.into(),
      call,
    }
  }

  /// Function identity, `anonymous` when constructed with an empty name.
  pub fn name(&self) -> &str {
    if self.name.is_empty() {
      "anonymous"
    } else {
      &self.name
    }
  }

  /// Invoke the function.
  pub fn call(&self, args: Vec<Value>) -> BoxFuture<'static, BackendResult> {
    (self.call)(args)
  }
}

impl fmt::Debug for BackendFn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BackendFn")
      .field("name", &self.name())
      .finish_non_exhaustive()
  }
}
