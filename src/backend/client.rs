use color_eyre::{eyre::eyre, Result};
use reqwest::header::CACHE_CONTROL;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::BackendError;

use super::types::{BiorhythmQuery, ErrorBody, HealthDataQuery};
use super::{BackendFn, BackendResult};

const BIORHYTHM_TIMEOUT: Duration = Duration::from_secs(10);
const ENVIRONMENT_TIMEOUT: Duration = Duration::from_secs(8);

/// HTTP client for the health assistant backend.
///
/// Each endpoint is exposed as a [`BackendFn`] so it can be routed through
/// the middleware (and queued, replayed and cached there).
#[derive(Clone)]
pub struct HealthApiClient {
  client: reqwest::Client,
  base_url: Url,
  health_timeout: Duration,
}

impl HealthApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.request_timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let base_url = parse_base_url(&config.api.url)?;

    Ok(Self {
      client,
      base_url,
      health_timeout: config.middleware.health_check_timeout(),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// `GET health`, used by the connectivity monitor.
  pub fn health_check(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("health_check", move |_args| {
      let this = this.clone();
      async move {
        let url = join_endpoint(&this.base_url, "health")?;
        let request = this
          .client
          .get(url)
          .header(CACHE_CONTROL, "no-cache")
          .timeout(this.health_timeout);
        this
          .send(request, "checking connectivity", "Health check failed")
          .await
      }
    })
  }

  /// `POST auth/google-fit`; args: `[auth_code]`
  pub fn authenticate_google_fit(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("authenticate_google_fit", move |args| {
      let this = this.clone();
      async move {
        let auth_code: String = required_arg(&args, 0, "authorization code")?;
        let url = join_endpoint(&this.base_url, "auth/google-fit")?;
        let request = this.client.post(url).json(&json!({ "authCode": auth_code }));
        this
          .send(
            request,
            "authenticating with Google Fit",
            "Failed to authenticate with Google Fit",
          )
          .await
      }
    })
  }

  /// `GET health-data`; args: `[HealthDataQuery]` (defaults to 30 days)
  pub fn fetch_health_data(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("fetch_health_data", move |args| {
      let this = this.clone();
      async move {
        let query: HealthDataQuery = optional_arg(&args, 0)?.unwrap_or_default();
        let url = health_data_url(&this.base_url, &query)?;
        let request = this.client.get(url);
        this
          .send(request, "fetching health data", "Failed to fetch health data")
          .await
      }
    })
  }

  /// `POST ai/insights`; args: `[InsightRequest]`
  pub fn get_health_insight(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("get_health_insight", move |args| {
      let this = this.clone();
      async move {
        let body: Value = required_arg(&args, 0, "insight request")?;
        let url = join_endpoint(&this.base_url, "ai/insights")?;
        let request = this.client.post(url).json(&body);
        this
          .send(request, "getting AI insights", "Failed to get AI insights")
          .await
      }
    })
  }

  /// `GET biorhythm/advice`; args: `[BiorhythmQuery]`
  pub fn get_biorhythm_advice(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("get_biorhythm_advice", move |args| {
      let this = this.clone();
      async move {
        let query: BiorhythmQuery = required_arg(&args, 0, "biorhythm query")?;
        let url = biorhythm_url(&this.base_url, &query)?;
        let request = this.client.get(url).timeout(BIORHYTHM_TIMEOUT);
        match this
          .send(
            request,
            "getting biorhythm advice",
            "Failed to get biorhythm advice",
          )
          .await
        {
          Err(e) if e.code.as_deref() == Some("HTTP_404") => Err(
            BackendError::new("Biorhythm advice service not available").with_code("HTTP_404"),
          ),
          other => other,
        }
      }
    })
  }

  /// `POST symptoms`; args: `[SymptomRecord]`
  pub fn submit_symptom(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("submit_symptom", move |args| {
      let this = this.clone();
      async move {
        let body: Value = required_arg(&args, 0, "symptom record")?;
        let url = join_endpoint(&this.base_url, "symptoms")?;
        let request = this.client.post(url).json(&body);
        this
          .send(request, "submitting symptom", "Failed to submit symptom")
          .await
      }
    })
  }

  /// `POST prediction`; args: `[HealthMetrics]`
  pub fn get_prediction(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("get_prediction", move |args| {
      let this = this.clone();
      async move {
        let body: Value = required_arg(&args, 0, "health metrics")?;
        let url = join_endpoint(&this.base_url, "prediction")?;
        let request = this.client.post(url).json(&body);
        this
          .send(request, "getting prediction", "Failed to get prediction")
          .await
      }
    })
  }

  /// `GET environment/advice`; no args
  pub fn get_environment_advice(&self) -> BackendFn {
    let this = self.clone();
    BackendFn::new("get_environment_advice", move |_args| {
      let this = this.clone();
      async move {
        let url = join_endpoint(&this.base_url, "environment/advice")?;
        let request = this.client.get(url).timeout(ENVIRONMENT_TIMEOUT);
        this
          .send(
            request,
            "getting environment advice",
            "Failed to get environment advice",
          )
          .await
      }
    })
  }

  /// Send a request and decode the JSON body, mapping failures to messages
  /// the middleware's classifier understands.
  async fn send(
    &self,
    request: RequestBuilder,
    action: &str,
    failure: &str,
  ) -> BackendResult {
    let response = request
      .send()
      .await
      .map_err(|e| transport_error(&e, action))?;

    let status = response.status();
    if !status.is_success() {
      let body: ErrorBody = response.json().await.unwrap_or_default();
      return Err(status_error(status, body.detail, failure));
    }

    response
      .json::<Value>()
      .await
      .map_err(|e| BackendError::new(format!("{}: invalid response body: {}", failure, e)))
  }
}

/// Parse the configured base URL, making sure relative joins append to it.
fn parse_base_url(raw: &str) -> Result<Url> {
  let mut normalized = raw.trim().to_string();
  if !normalized.ends_with('/') {
    normalized.push('/');
  }
  Url::parse(&normalized).map_err(|e| eyre!("Invalid API url '{}': {}", raw, e))
}

fn join_endpoint(base: &Url, path: &str) -> Result<Url, BackendError> {
  base
    .join(path)
    .map_err(|e| BackendError::new(format!("Invalid endpoint '{}': {}", path, e)))
}

fn health_data_url(base: &Url, query: &HealthDataQuery) -> Result<Url, BackendError> {
  let mut url = join_endpoint(base, "health-data")?;
  {
    let mut pairs = url.query_pairs_mut();
    pairs.append_pair("days", &query.days.to_string());
    for field in query.fields.iter().flatten() {
      pairs.append_pair("fields", field);
    }
  }
  Ok(url)
}

fn biorhythm_url(base: &Url, query: &BiorhythmQuery) -> Result<Url, BackendError> {
  let mut url = join_endpoint(base, "biorhythm/advice")?;
  url
    .query_pairs_mut()
    .append_pair("chronotype", &query.chronotype)
    .append_pair("medicationTime", &query.medication_time);
  Ok(url)
}

fn transport_error(err: &reqwest::Error, action: &str) -> BackendError {
  if err.is_timeout() {
    BackendError::new(format!("Request timed out while {}", action))
  } else if err.is_connect() || err.is_request() {
    BackendError::new(format!("Failed to fetch while {}: {}", action, err))
  } else {
    BackendError::new(format!("Error while {}: {}", action, err))
  }
}

fn status_error(status: StatusCode, detail: Option<String>, failure: &str) -> BackendError {
  let detail = detail.unwrap_or_else(|| failure.to_string());
  BackendError::new(format!("{}: {}", status, detail))
    .with_code(format!("HTTP_{}", status.as_u16()))
}

fn required_arg<T: DeserializeOwned>(
  args: &[Value],
  index: usize,
  what: &str,
) -> Result<T, BackendError> {
  optional_arg(args, index)?
    .ok_or_else(|| BackendError::new(format!("Missing {} argument", what)).with_code("BAD_ARGS"))
}

fn optional_arg<T: DeserializeOwned>(
  args: &[Value],
  index: usize,
) -> Result<Option<T>, BackendError> {
  match args.get(index) {
    None | Some(Value::Null) => Ok(None),
    Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
      BackendError::new(format!("Invalid argument {}: {}", index, e)).with_code("BAD_ARGS")
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  #[test]
  fn test_base_url_keeps_api_prefix() {
    let base = parse_base_url("http://localhost:8000/api").unwrap();
    let url = join_endpoint(&base, "health").unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/health");
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(parse_base_url("not a url").is_err());
  }

  #[test]
  fn test_health_data_url_repeats_fields() {
    let base = parse_base_url("http://localhost:8000/api/").unwrap();
    let query = HealthDataQuery {
      days: 7,
      fields: Some(vec!["steps".to_string(), "heart_rate".to_string()]),
    };
    let url = health_data_url(&base, &query).unwrap();
    assert_eq!(
      url.as_str(),
      "http://localhost:8000/api/health-data?days=7&fields=steps&fields=heart_rate"
    );
  }

  #[test]
  fn test_biorhythm_url_encodes_params() {
    let base = parse_base_url("https://example.org/api").unwrap();
    let query = BiorhythmQuery {
      chronotype: "morning".to_string(),
      medication_time: "08:00 AM".to_string(),
    };
    let url = biorhythm_url(&base, &query).unwrap();
    assert_eq!(
      url.as_str(),
      "https://example.org/api/biorhythm/advice?chronotype=morning&medicationTime=08%3A00+AM"
    );
  }

  #[test]
  fn test_status_error_is_classifiable() {
    let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, None, "Failed to submit symptom");
    assert_eq!(err.message, "500 Internal Server Error: Failed to submit symptom");
    assert_eq!(err.code.as_deref(), Some("HTTP_500"));
    assert_eq!(ErrorKind::classify(&err.message), ErrorKind::Server);

    let auth = status_error(StatusCode::UNAUTHORIZED, Some("token expired".to_string()), "x");
    assert_eq!(ErrorKind::classify(&auth.message), ErrorKind::Auth);
  }

  #[test]
  fn test_args_decoding() {
    let args = vec![serde_json::json!({ "days": 7 })];
    let query: HealthDataQuery = optional_arg(&args, 0).unwrap().unwrap();
    assert_eq!(query.days, 7);

    let missing: Option<HealthDataQuery> = optional_arg(&[], 0).unwrap();
    assert!(missing.is_none());

    let err = required_arg::<String>(&[], 0, "authorization code").unwrap_err();
    assert_eq!(err.code.as_deref(), Some("BAD_ARGS"));

    let bad = optional_arg::<HealthDataQuery>(&[serde_json::json!("seven")], 0).unwrap_err();
    assert!(bad.message.starts_with("Invalid argument 0"));
  }
}
