use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const API_URL_ENV: &str = "VITALINK_API_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub middleware: MiddlewareConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Log filter used when RUST_LOG is not set
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      middleware: MiddlewareConfig::default(),
      cache: CacheConfig::default(),
      log_level: default_log_level(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend, e.g. http://localhost:8000/api
  #[serde(default = "default_api_url")]
  pub url: String,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
  "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
  30
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      request_timeout_secs: default_request_timeout_secs(),
    }
  }
}

/// Tuning knobs for the middleware. Defaults match the mobile app.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MiddlewareConfig {
  /// How long a cached response stays valid
  pub cache_expiry_secs: u64,
  /// Period of the monitor tick (queue replay and reconnect probes)
  pub queue_interval_secs: u64,
  /// Replay attempts per queued request before it is dropped
  pub max_retries: u32,
  /// Probes attempted by the periodic tick while offline
  pub max_reconnect_attempts: u32,
  pub health_check_timeout_ms: u64,
  pub error_display_ms: u64,
  pub success_display_ms: u64,
  /// Active requests older than this count as slow
  pub slow_request_ms: u64,
}

impl Default for MiddlewareConfig {
  fn default() -> Self {
    Self {
      cache_expiry_secs: 24 * 60 * 60,
      queue_interval_secs: 15,
      max_retries: 3,
      max_reconnect_attempts: 5,
      health_check_timeout_ms: 5_000,
      error_display_ms: 5_000,
      success_display_ms: 3_000,
      slow_request_ms: 8_000,
    }
  }
}

impl MiddlewareConfig {
  pub fn cache_expiry(&self) -> chrono::Duration {
    let secs = i64::try_from(self.cache_expiry_secs)
      .unwrap_or(i64::MAX)
      .min(i64::MAX / 1_000);
    chrono::Duration::seconds(secs)
  }

  pub fn queue_interval(&self) -> Duration {
    Duration::from_secs(self.queue_interval_secs.max(1))
  }

  pub fn health_check_timeout(&self) -> Duration {
    Duration::from_millis(self.health_check_timeout_ms)
  }

  pub fn error_display(&self) -> Duration {
    Duration::from_millis(self.error_display_ms)
  }

  pub fn success_display(&self) -> Duration {
    Duration::from_millis(self.success_display_ms)
  }

  pub fn slow_request(&self) -> Duration {
    Duration::from_millis(self.slow_request_ms)
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// In-process map, lost on exit
  #[default]
  Memory,
  /// SQLite file under the user data dir
  Sqlite,
  /// Caching disabled
  None,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
}

impl Config {
  /// Load configuration.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./vitalink.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vitalink/config.yaml
  ///
  /// Falls back to defaults when no file is found. VITALINK_API_URL
  /// overrides `api.url` in every case.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      if !url.trim().is_empty() {
        config.api.url = url;
      }
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("vitalink.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vitalink").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Directory for logs and the persistent cache.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("vitalink"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config.api.url, "http://localhost:8000/api");
    assert_eq!(config.middleware, MiddlewareConfig::default());
    assert_eq!(config.middleware.cache_expiry(), chrono::Duration::hours(24));
    assert_eq!(config.middleware.queue_interval(), Duration::from_secs(15));
    assert_eq!(config.cache.backend, CacheBackend::Memory);
    assert_eq!(config.log_level, "info");
  }

  #[test]
  fn test_partial_middleware_section() {
    let config = Config::from_yaml(
      r#"
api:
  url: https://health.example.org/api
middleware:
  max_retries: 5
  success_display_ms: 1000
cache:
  backend: sqlite
"#,
    )
    .unwrap();

    assert_eq!(config.api.url, "https://health.example.org/api");
    assert_eq!(config.api.request_timeout_secs, 30);
    assert_eq!(config.middleware.max_retries, 5);
    assert_eq!(config.middleware.success_display(), Duration::from_secs(1));
    assert_eq!(config.middleware.max_reconnect_attempts, 5);
    assert_eq!(config.cache.backend, CacheBackend::Sqlite);
  }

  #[test]
  fn test_unknown_backend_is_rejected() {
    assert!(Config::from_yaml("cache:\n  backend: redis\n").is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "log_level: debug").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.log_level, "debug");
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/vitalink.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
