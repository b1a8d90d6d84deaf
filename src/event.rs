use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

/// Events that drive the middleware's background work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Periodic tick for queue replay and reconnect probes
  Tick,
  /// Platform reports the network is reachable
  Online,
  /// Platform reports the network is gone
  Offline,
}

/// Event handler that produces events from a tick timer and from
/// connectivity signals pushed through [`EventHandler::sender`]
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let ticker = tx.clone();
    tokio::spawn(async move {
      // First tick fires one period from now, not immediately
      let mut interval = time::interval_at(time::Instant::now() + tick_rate, tick_rate);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        if ticker.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for platform connectivity signals
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
