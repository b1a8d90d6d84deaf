//! Error types for backend calls and the classification applied to them.

use serde::Serialize;
use std::fmt;

use crate::middleware::RequestId;

/// Failure reported by a backend function.
///
/// Backend functions are opaque; all the middleware relies on is a
/// human-readable message and an optional machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
  pub message: String,
  pub code: Option<String>,
}

impl BackendError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      code: None,
    }
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = Some(code.into());
    self
  }
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  /// Transport-level failure; the backend could not be reached
  Network,
  /// The request exceeded its deadline
  Timeout,
  /// 401-class failure
  Auth,
  /// 403-class failure
  Forbidden,
  /// 5xx-class failure
  Server,
  /// Not a failure: the call was deferred for replay once back online
  Queued,
  /// Anything else
  Unknown,
}

impl ErrorKind {
  /// Classify a raw backend message.
  ///
  /// Checks run in a fixed order; the first match wins. Status codes only
  /// count as whole three-digit words, and the first one in the message is
  /// taken as the response status.
  pub fn classify(message: &str) -> Self {
    let lower = message.to_lowercase();

    if message.contains("Failed to fetch")
      || message.contains("NetworkError")
      || lower.contains("network error")
    {
      return Self::Network;
    }
    if lower.contains("timeout") || lower.contains("timed out") {
      return Self::Timeout;
    }
    if let Some(status) = first_status(message) {
      return Self::from_status(status);
    }

    if message.contains("Unauthorized") {
      Self::Auth
    } else if message.contains("Forbidden") {
      Self::Forbidden
    } else if message.contains("Internal Server Error") {
      Self::Server
    } else if lower.contains("offline") || lower.contains("queued") {
      Self::Queued
    } else {
      Self::Unknown
    }
  }

  /// Classify a backend error code of the form `HTTP_<status>`.
  ///
  /// Returns `None` for any other code so the message decides.
  pub fn from_code(code: &str) -> Option<Self> {
    let status = code.strip_prefix("HTTP_")?.parse::<u16>().ok()?;
    (100..600).contains(&status).then(|| Self::from_status(status))
  }

  fn from_status(status: u16) -> Self {
    match status {
      401 => Self::Auth,
      403 => Self::Forbidden,
      500..=599 => Self::Server,
      _ => Self::Unknown,
    }
  }

  /// Machine-readable code used when the backend supplied none.
  pub fn code(self) -> &'static str {
    match self {
      Self::Network => "NETWORK",
      Self::Timeout => "TIMEOUT",
      Self::Auth => "AUTH",
      Self::Forbidden => "FORBIDDEN",
      Self::Server => "SERVER",
      Self::Queued => "QUEUED",
      Self::Unknown => "UNKNOWN",
    }
  }

  /// Message shown to the user for this kind of failure.
  ///
  /// `Unknown` passes the raw message through.
  pub fn user_message(self, raw: &str) -> String {
    match self {
      Self::Network => "Network error: Please check your connection and try again.".to_string(),
      Self::Timeout => "Request timed out: The server took too long to respond.".to_string(),
      Self::Auth => "Authentication error: Please log in again.".to_string(),
      Self::Forbidden => {
        "Access denied: You don't have permission to access this resource.".to_string()
      }
      Self::Server => {
        "Server error: Our system is experiencing issues. Please try again later.".to_string()
      }
      Self::Queued => QUEUED_MESSAGE.to_string(),
      Self::Unknown if raw.trim().is_empty() => "An unknown error occurred".to_string(),
      Self::Unknown => raw.to_string(),
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

/// First whole-word HTTP status in `message`.
fn first_status(message: &str) -> Option<u16> {
  message
    .split(|c: char| !c.is_ascii_alphanumeric())
    .filter(|word| word.len() == 3)
    .filter_map(|word| word.parse::<u16>().ok())
    .find(|status| (100..600).contains(status))
}

pub(crate) const QUEUED_MESSAGE: &str =
  "You're currently offline. Request has been queued for when you're back online.";

/// Error returned by [`ApiMiddleware::execute`](crate::ApiMiddleware::execute).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
  pub kind: ErrorKind,
  /// User-facing message (custom message, or the kind's text)
  pub message: String,
  /// Raw message from the backend
  pub detail: String,
  pub code: String,
  pub retryable: bool,
  /// Id of the queued request, for `Queued` errors
  pub request_id: Option<RequestId>,
}

impl ApiError {
  /// The deferral marker returned when a call is queued while offline.
  pub fn queued(request_id: RequestId) -> Self {
    Self {
      kind: ErrorKind::Queued,
      message: QUEUED_MESSAGE.to_string(),
      detail: QUEUED_MESSAGE.to_string(),
      code: ErrorKind::Queued.code().to_string(),
      retryable: true,
      request_id: Some(request_id),
    }
  }

  /// Build a classified error from a backend failure.
  ///
  /// An `HTTP_<status>` code wins over the message text.
  pub fn from_backend(
    err: BackendError,
    custom_message: Option<&str>,
    retryable: bool,
  ) -> Self {
    let kind = err
      .code
      .as_deref()
      .and_then(ErrorKind::from_code)
      .unwrap_or_else(|| ErrorKind::classify(&err.message));
    let message = custom_message
      .map(String::from)
      .unwrap_or_else(|| kind.user_message(&err.message));
    let code = err.code.unwrap_or_else(|| kind.code().to_string());

    Self {
      kind,
      message,
      detail: err.message,
      code,
      retryable,
      request_id: None,
    }
  }

  pub fn is_queued(&self) -> bool {
    self.kind == ErrorKind::Queued
  }
}
