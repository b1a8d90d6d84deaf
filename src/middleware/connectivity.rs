//! Connectivity transitions, health probes and offline queue replay.

use tracing::{debug, info, warn};

use super::{ApiMiddleware, RequestOptions, BACK_ONLINE_MESSAGE};
use crate::event::Event;
use crate::queue::ReplayOutcome;

impl ApiMiddleware {
  /// React to a platform connectivity signal or the periodic tick.
  pub async fn handle_event(&self, event: Event) -> Vec<ReplayOutcome> {
    match event {
      Event::Tick => self.tick().await,
      Event::Online => self.handle_online().await,
      Event::Offline => {
        self.handle_offline();
        Vec::new()
      }
    }
  }

  /// The platform reports the network is back.
  ///
  /// On an Offline -> Online transition this publishes the back-online
  /// notice and drains the queue once.
  pub async fn handle_online(&self) -> Vec<ReplayOutcome> {
    if !self.inner.network.go_online() {
      return Vec::new();
    }
    self.publish(|state| state.offline = false);
    self.notify_success(BACK_ONLINE_MESSAGE);
    self.drain_queue().await
  }

  /// The platform reports the network is gone.
  pub fn handle_offline(&self) {
    if self.inner.network.go_offline() {
      self.publish(|state| state.offline = true);
    }
  }

  /// Probe the backend health endpoint and update connectivity.
  ///
  /// A successful probe marks us online and replays anything queued. A
  /// failed or timed-out probe marks us offline and counts a reconnect
  /// attempt.
  pub async fn check_connection(&self) -> bool {
    self.reconnect().await.0
  }

  async fn reconnect(&self) -> (bool, Vec<ReplayOutcome>) {
    if !self.probe().await {
      self.inner.network.record_failed_probe();
      self.publish(|state| state.offline = true);
      return (false, Vec::new());
    }

    if self.inner.network.go_online() {
      self.publish(|state| state.offline = false);
      self.notify_success(BACK_ONLINE_MESSAGE);
    }
    (true, self.drain_queue().await)
  }

  async fn probe(&self) -> bool {
    let timeout = self.inner.config.health_check_timeout();
    match tokio::time::timeout(timeout, self.inner.health.call(Vec::new())).await {
      Ok(Ok(_)) => true,
      Ok(Err(err)) => {
        debug!(error = %err, "health check failed");
        false
      }
      Err(_) => {
        debug!(?timeout, "health check timed out");
        false
      }
    }
  }

  /// Periodic maintenance: replay the queue while online, and probe for
  /// connectivity while offline until the reconnect budget runs out.
  pub async fn tick(&self) -> Vec<ReplayOutcome> {
    let network = &self.inner.network;

    if !network.is_offline() {
      if self.inner.queue.is_empty() {
        return Vec::new();
      }
      return self.drain_queue().await;
    }

    if network.should_probe() {
      debug!(attempt = network.reconnect_attempts() + 1, "probing for connectivity");
      return self.reconnect().await.1;
    }
    Vec::new()
  }

  /// Replay every queued request once, in FIFO order.
  ///
  /// Does nothing while offline. Requests are taken out of the queue before
  /// replay, so concurrent drains never run the same request twice. Each
  /// replay goes through [`execute`](Self::execute) with queueing disabled;
  /// failures are requeued until the retry budget is spent and then dropped.
  pub async fn drain_queue(&self) -> Vec<ReplayOutcome> {
    if self.inner.network.is_offline() {
      return Vec::new();
    }

    let batch = self.inner.queue.take_all();
    if batch.is_empty() {
      return Vec::new();
    }
    info!(count = batch.len(), "replaying queued requests");
    self.publish_pending();

    let mut outcomes = Vec::with_capacity(batch.len());
    for item in batch {
      let options = RequestOptions {
        skip_queue: true,
        custom_error_msg: Some(format!(
          "Failed to process queued request: {}",
          item.description
        )),
        ..item.options.clone()
      };

      let outcome = match self
        .execute(&item.backend, item.args.clone(), options)
        .await
      {
        Ok(value) => {
          debug!(id = %item.id, "queued request completed");
          ReplayOutcome::Completed {
            id: item.id,
            description: item.description,
            value,
          }
        }
        Err(error) => {
          warn!(id = %item.id, error = %error.detail, "queued request failed");
          self.inner.queue.settle_failure(item, error)
        }
      };
      outcomes.push(outcome);
    }

    self.publish_pending();
    outcomes
  }

  /// Clear the visible error and replay the queue if we're online.
  pub async fn retry_last_request(&self) -> Vec<ReplayOutcome> {
    self.clear_error();
    self.drain_queue().await
  }

  /// Forget connectivity failure history, then probe immediately.
  pub async fn reset_connection_state(&self) -> bool {
    self.inner.network.reset();
    self.publish(|state| {
      state.offline = false;
      state.api_retries = 0;
    });
    info!("connection state reset");
    self.check_connection().await
  }
}
