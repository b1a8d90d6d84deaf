use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_SUCCESS_MESSAGE: &str = "Operation completed successfully";

/// Per-call options for [`ApiMiddleware::execute`](super::ApiMiddleware::execute).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
  /// Neither read nor write the response cache
  pub skip_cache: bool,
  /// Run the call even when offline instead of queueing it
  pub skip_queue: bool,
  /// Mark resulting errors as not retryable
  pub skip_retry: bool,
  /// Leave the loading flag alone
  pub skip_loading: bool,
  /// Replaces the classified user-facing error message
  pub custom_error_msg: Option<String>,
  /// Replaces the derived cache fingerprint
  pub cache_key: Option<String>,
  /// Publish a success notice when the call succeeds
  pub show_success_message: bool,
  pub success_message: Option<String>,
  /// Label for the request while it sits in the offline queue. Arguments
  /// are never used for this since they may hold credentials.
  pub description: Option<String>,
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn skip_cache(mut self) -> Self {
    self.skip_cache = true;
    self
  }

  pub fn skip_queue(mut self) -> Self {
    self.skip_queue = true;
    self
  }

  pub fn skip_retry(mut self) -> Self {
    self.skip_retry = true;
    self
  }

  pub fn skip_loading(mut self) -> Self {
    self.skip_loading = true;
    self
  }

  pub fn with_custom_error(mut self, message: impl Into<String>) -> Self {
    self.custom_error_msg = Some(message.into());
    self
  }

  pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
    self.cache_key = Some(key.into());
    self
  }

  /// Show a success notice, optionally with a custom message.
  pub fn with_success_message(mut self, message: Option<String>) -> Self {
    self.show_success_message = true;
    self.success_message = message;
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub(crate) fn success_text(&self) -> &str {
    self
      .success_message
      .as_deref()
      .unwrap_or(DEFAULT_SUCCESS_MESSAGE)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builder() {
    let options = RequestOptions::new()
      .skip_cache()
      .skip_retry()
      .with_cache_key("profile")
      .with_success_message(None);

    assert!(options.skip_cache);
    assert!(options.skip_retry);
    assert!(!options.skip_queue);
    assert_eq!(options.cache_key.as_deref(), Some("profile"));
    assert!(options.show_success_message);
    assert_eq!(options.success_text(), DEFAULT_SUCCESS_MESSAGE);
  }

  #[test]
  fn test_deserialize_partial() {
    let options: RequestOptions =
      serde_json::from_str(r#"{"skip_queue": true, "success_message": "Saved"}"#).unwrap();
    assert!(options.skip_queue);
    assert!(!options.show_success_message);
    assert_eq!(options.success_text(), "Saved");
  }
}
