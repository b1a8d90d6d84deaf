use crate::commands::Command;
use color_eyre::{eyre::eyre, Report, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vitalink::backend::types::{
  BiorhythmQuery, HealthDataQuery, HealthMetrics, InsightRequest, SymptomRecord,
};
use vitalink::cache::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
use vitalink::config::{CacheBackend, Config};
use vitalink::{
  ApiError, ApiMiddleware, BackendFn, EventHandler, HealthApiClient, ReplayOutcome,
  RequestOptions,
};

const CACHE_DB: &str = "cache.db";

/// Main application state
pub struct App {
  client: HealthApiClient,
  middleware: ApiMiddleware,
  /// Period of the monitor tick in `watch` and `--wait`
  tick_rate: Duration,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = HealthApiClient::new(&config)?;
    let storage = open_storage(config.cache.backend)?;
    let middleware =
      ApiMiddleware::with_storage(config.middleware.clone(), client.health_check(), storage);

    Ok(Self {
      client,
      middleware,
      tick_rate: config.middleware.queue_interval(),
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    info!(api = %self.client.base_url(), ?command, "starting");

    // Learn the connectivity state up front so calls made while the backend
    // is unreachable are queued instead of failing one by one
    let online = self.middleware.check_connection().await;
    if !online {
      eprintln!("Backend unreachable, working offline");
    }

    let options = if command.is_mutation() {
      RequestOptions::new()
        .skip_cache()
        .with_success_message(Some("Symptom logged".to_string()))
    } else {
      RequestOptions::default()
    };

    match command {
      Command::Status => print_json(&json!({
        "online": online,
        "connectivity": self.middleware.connectivity(),
        "state": self.middleware.state(),
        "connection_warning": self.middleware.state().connection_warning(),
        "metrics": self.middleware.metrics(),
      })),

      Command::HealthData { days, fields } => {
        let query = HealthDataQuery {
          days,
          fields: (!fields.is_empty()).then_some(fields),
        };
        let args = vec![serde_json::to_value(query)?];
        self
          .request(&self.client.fetch_health_data(), args, options)
          .await
      }

      Command::Insight {
        symptom,
        severity,
        metrics,
      } => {
        let health_metrics = match metrics {
          Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| eyre!("--metrics must be a JSON object: {}", e))?,
          None => json!({}),
        };
        let request = InsightRequest {
          symptom: SymptomRecord::now(symptom, severity),
          health_metrics,
        };
        let args = vec![serde_json::to_value(request)?];
        self
          .request(&self.client.get_health_insight(), args, options)
          .await
      }

      Command::Prediction {
        age,
        bmi,
        glucose,
        sbp,
        dbp,
      } => {
        let metrics = HealthMetrics {
          age,
          bmi,
          glucose,
          sbp,
          dbp,
        };
        let args = vec![serde_json::to_value(metrics)?];
        self
          .request(&self.client.get_prediction(), args, options)
          .await
      }

      Command::Biorhythm {
        chronotype,
        medication_time,
      } => {
        let query = BiorhythmQuery {
          chronotype,
          medication_time,
        };
        let args = vec![serde_json::to_value(query)?];
        self
          .request(&self.client.get_biorhythm_advice(), args, options)
          .await
      }

      Command::Environment => {
        self
          .request(&self.client.get_environment_advice(), Vec::new(), options)
          .await
      }

      Command::SubmitSymptom {
        symptom,
        severity,
        notes,
        duration,
        triggers,
        wait,
      } => {
        let options = options.with_description(format!("Log symptom: {}", symptom));
        let mut record = SymptomRecord::now(symptom, severity);
        record.notes = notes;
        record.duration = duration;
        record.triggers = triggers;

        let submit = self.client.submit_symptom();
        match self
          .middleware
          .execute(&submit, vec![serde_json::to_value(&record)?], options)
          .await
        {
          Ok(value) => print_json(&value),
          Err(err) if err.is_queued() => {
            eprintln!("{}", err.message);
            match wait {
              Some(secs) => self.watch(Some(Duration::from_secs(secs)), true).await,
              None => Ok(()),
            }
          }
          Err(err) => Err(report(err)),
        }
      }

      Command::Watch { duration } => {
        self
          .watch(duration.map(Duration::from_secs), false)
          .await
      }
    }
  }

  async fn request(
    &self,
    backend: &BackendFn,
    args: Vec<Value>,
    options: RequestOptions,
  ) -> Result<()> {
    let value = self
      .middleware
      .execute(backend, args, options)
      .await
      .map_err(report)?;
    print_json(&value)
  }

  /// Drive the middleware from the event loop, printing replays and state
  /// changes as JSON lines.
  ///
  /// Stops on Ctrl-C, when `limit` elapses, or (with `until_drained`) once
  /// the offline queue is empty.
  async fn watch(&self, limit: Option<Duration>, until_drained: bool) -> Result<()> {
    let mut events = EventHandler::new(self.tick_rate);
    let mut state = self.middleware.subscribe();
    let deadline = tokio::time::sleep(limit.unwrap_or(Duration::MAX));
    tokio::pin!(deadline);

    loop {
      tokio::select! {
        Some(event) = events.next() => {
          for outcome in self.middleware.handle_event(event).await {
            print_line(&json!({ "replay": ReplayView::from(&outcome) }))?;
          }
          if until_drained && self.middleware.pending_requests().is_empty() {
            break;
          }
        }
        Ok(()) = state.changed() => {
          let snapshot = state.borrow_and_update().clone();
          print_line(&json!({ "state": snapshot }))?;
        }
        _ = &mut deadline, if limit.is_some() => break,
        _ = tokio::signal::ctrl_c() => break,
      }
    }

    let pending = self.middleware.pending_requests();
    if !pending.is_empty() {
      eprintln!("{} request(s) still queued and will be discarded", pending.len());
    }
    Ok(())
  }
}

fn open_storage(backend: CacheBackend) -> Result<Arc<dyn CacheStorage>> {
  let storage: Arc<dyn CacheStorage> = match backend {
    CacheBackend::Memory => Arc::new(MemoryStorage::new()),
    CacheBackend::Sqlite => {
      Arc::new(SqliteStorage::open(&Config::data_dir()?.join(CACHE_DB))?)
    }
    CacheBackend::None => Arc::new(NoopStorage),
  };
  Ok(storage)
}

fn report(err: ApiError) -> Report {
  eyre!("{} [{}] ({})", err.message, err.code, err.detail)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_line<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string(value)?);
  Ok(())
}

/// Serializable view of a replay outcome
#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum ReplayView<'a> {
  Completed {
    id: String,
    description: &'a str,
    value: &'a Value,
  },
  Requeued {
    id: String,
    description: &'a str,
    retries: u32,
    error: &'a str,
  },
  Dropped {
    id: String,
    description: &'a str,
    error: &'a str,
  },
}

impl<'a> From<&'a ReplayOutcome> for ReplayView<'a> {
  fn from(outcome: &'a ReplayOutcome) -> Self {
    match outcome {
      ReplayOutcome::Completed {
        id,
        description,
        value,
      } => ReplayView::Completed {
        id: id.to_string(),
        description,
        value,
      },
      ReplayOutcome::Requeued {
        id,
        description,
        retries,
        error,
      } => ReplayView::Requeued {
        id: id.to_string(),
        description,
        retries: *retries,
        error: &error.message,
      },
      ReplayOutcome::Dropped {
        id,
        description,
        error,
      } => ReplayView::Dropped {
        id: id.to_string(),
        description,
        error: &error.message,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use vitalink::error::BackendError;
  use vitalink::middleware::RequestId;

  #[test]
  fn test_replay_view_is_tagged() {
    let outcome = ReplayOutcome::Requeued {
      id: RequestId(4),
      description: "Log headache".to_string(),
      retries: 1,
      error: ApiError::from_backend(BackendError::new("503"), None, true),
    };

    let value = serde_json::to_value(ReplayView::from(&outcome)).unwrap();
    assert_eq!(value["outcome"], "requeued");
    assert_eq!(value["id"], "req-4");
    assert_eq!(value["retries"], 1);
    assert!(value["error"].as_str().unwrap().starts_with("Server error"));
  }

  #[test]
  fn test_open_storage_without_cache() {
    let storage = open_storage(CacheBackend::None).unwrap();
    storage
      .set("k", &vitalink::cache::CacheEntry::new(json!(1)))
      .unwrap();
    assert_eq!(storage.len().unwrap(), 0);
  }
}
