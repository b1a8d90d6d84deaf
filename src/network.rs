//! Connectivity tracking.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// The monitor's belief about connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
  pub is_offline: bool,
  pub last_online: DateTime<Utc>,
  pub last_offline: Option<DateTime<Utc>>,
  /// Failed probes since the last time we were online
  pub reconnect_attempts: u32,
}

impl Default for ConnectivityState {
  fn default() -> Self {
    Self {
      is_offline: false,
      last_online: Utc::now(),
      last_offline: None,
      reconnect_attempts: 0,
    }
  }
}

/// Two-state (online/offline) connectivity monitor.
///
/// Transitions return whether the state actually changed so the caller
/// can run the side effects of a transition (queue replay, notices)
/// exactly once.
pub struct NetworkMonitor {
  state: Mutex<ConnectivityState>,
  /// Probes the periodic tick may attempt while offline
  max_reconnect_attempts: u32,
}

impl NetworkMonitor {
  pub fn new(max_reconnect_attempts: u32) -> Self {
    Self {
      state: Mutex::new(ConnectivityState::default()),
      max_reconnect_attempts,
    }
  }

  fn state(&self) -> MutexGuard<'_, ConnectivityState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn is_offline(&self) -> bool {
    self.state().is_offline
  }

  pub fn reconnect_attempts(&self) -> u32 {
    self.state().reconnect_attempts
  }

  pub fn snapshot(&self) -> ConnectivityState {
    self.state().clone()
  }

  /// Mark offline. Returns true on an Online -> Offline transition.
  pub fn go_offline(&self) -> bool {
    let mut state = self.state();
    if state.is_offline {
      return false;
    }
    state.is_offline = true;
    state.last_offline = Some(Utc::now());
    warn!("connectivity lost, switching to offline mode");
    true
  }

  /// Mark online and reset reconnect tracking. Returns true on an
  /// Offline -> Online transition.
  pub fn go_online(&self) -> bool {
    let mut state = self.state();
    let was_offline = state.is_offline;
    state.is_offline = false;
    state.last_online = Utc::now();
    state.reconnect_attempts = 0;
    if was_offline {
      info!("connectivity restored");
    }
    was_offline
  }

  /// Record a failed health check: bump the attempt counter and mark
  /// offline. Returns true on an Online -> Offline transition.
  pub fn record_failed_probe(&self) -> bool {
    let mut state = self.state();
    state.reconnect_attempts = state.reconnect_attempts.saturating_add(1);
    if state.is_offline {
      return false;
    }
    state.is_offline = true;
    state.last_offline = Some(Utc::now());
    warn!("health check failed, switching to offline mode");
    true
  }

  /// Whether the periodic tick should attempt a reconnect probe.
  pub fn should_probe(&self) -> bool {
    let state = self.state();
    state.is_offline && state.reconnect_attempts < self.max_reconnect_attempts
  }

  /// Forget any failure history and assume we're online.
  pub fn reset(&self) {
    let mut state = self.state();
    state.is_offline = false;
    state.reconnect_attempts = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_starts_online() {
    let monitor = NetworkMonitor::new(5);
    assert!(!monitor.is_offline());
    assert!(!monitor.should_probe());
    assert_eq!(monitor.snapshot().last_offline, None);
  }

  #[test]
  fn test_transitions_report_changes_once() {
    let monitor = NetworkMonitor::new(5);
    assert!(monitor.go_offline());
    assert!(!monitor.go_offline());
    assert!(monitor.snapshot().last_offline.is_some());

    assert!(monitor.go_online());
    assert!(!monitor.go_online());
  }

  #[test]
  fn test_failed_probes_count_and_online_resets() {
    let monitor = NetworkMonitor::new(2);
    assert!(monitor.record_failed_probe());
    assert!(monitor.is_offline());
    assert!(!monitor.record_failed_probe());
    assert_eq!(monitor.reconnect_attempts(), 2);
    // Probe budget exhausted
    assert!(!monitor.should_probe());

    monitor.go_online();
    assert_eq!(monitor.reconnect_attempts(), 0);
    assert!(!monitor.is_offline());
  }

  #[test]
  fn test_reset() {
    let monitor = NetworkMonitor::new(5);
    monitor.record_failed_probe();
    monitor.reset();
    assert!(!monitor.is_offline());
    assert_eq!(monitor.reconnect_attempts(), 0);
  }
}
