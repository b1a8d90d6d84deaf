mod app;
mod commands;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use vitalink::config::Config;

#[derive(Parser, Debug)]
#[command(name = "vitalink")]
#[command(about = "Offline-aware client for the health assistant API")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./vitalink.yaml, then $XDG_CONFIG_HOME/vitalink/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Backend API base URL (overrides config and VITALINK_API_URL)
  #[arg(long, global = true)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override API url if specified on command line
  if let Some(url) = args.api_url {
    config.api.url = url;
  }

  let _log_guard = vitalink::logging::init(&config)?;

  let app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn test_cli_definition() {
    Args::command().debug_assert();
  }

  #[test]
  fn test_global_flags_after_subcommand() {
    let args = Args::try_parse_from([
      "vitalink",
      "status",
      "--api-url",
      "http://127.0.0.1:9000/api",
    ])
    .unwrap();
    assert_eq!(args.api_url.as_deref(), Some("http://127.0.0.1:9000/api"));
    assert_eq!(args.command, commands::Command::Status);
  }
}
