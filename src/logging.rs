use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

const LOG_FILE: &str = "vitalink.log";

/// Install the global subscriber, writing to a daily-rotated file under the
/// user data dir so stdout stays free for command output.
///
/// `RUST_LOG` wins over the configured level. Keep the returned guard alive
/// for the life of the process or buffered lines are lost.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let dir = Config::data_dir()?.join("logs");
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.log_level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .with_target(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
