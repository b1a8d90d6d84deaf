//! Observable middleware state for UI binding.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Transient error notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
  pub message: String,
  pub timestamp: DateTime<Utc>,
  pub code: String,
  pub retryable: bool,
}

/// Transient success notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessNotice {
  pub message: String,
  pub timestamp: DateTime<Utc>,
}

/// Escalating banner after repeated network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionWarning {
  None,
  /// More than 2 network failures: running on local data
  ServerIssues,
  /// More than 4: the server can't be reached at all
  ConnectionProblem,
}

/// Snapshot of everything a UI binds to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiState {
  pub is_loading: bool,
  pub error: Option<ErrorNotice>,
  pub success: Option<SuccessNotice>,
  pub offline: bool,
  pub pending_requests: usize,
  /// Network-classified failures since the last reset
  pub api_retries: u32,
}

impl ApiState {
  pub fn connection_warning(&self) -> ConnectionWarning {
    match self.api_retries {
      n if n > 4 => ConnectionWarning::ConnectionProblem,
      n if n > 2 => ConnectionWarning::ServerIssues,
      _ => ConnectionWarning::None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connection_warning_thresholds() {
    let warning = |api_retries| {
      ApiState {
        api_retries,
        ..Default::default()
      }
      .connection_warning()
    };

    assert_eq!(warning(0), ConnectionWarning::None);
    assert_eq!(warning(2), ConnectionWarning::None);
    assert_eq!(warning(3), ConnectionWarning::ServerIssues);
    assert_eq!(warning(4), ConnectionWarning::ServerIssues);
    assert_eq!(warning(5), ConnectionWarning::ConnectionProblem);
  }
}
