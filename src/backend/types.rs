//! Wire types for the health assistant backend.

use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query for `GET health-data`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthDataQuery {
  pub days: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fields: Option<Vec<String>>,
}

impl Default for HealthDataQuery {
  fn default() -> Self {
    Self {
      days: 30,
      fields: None,
    }
  }
}

/// Symptom record for `POST symptoms`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymptomRecord {
  pub symptom: String,
  /// "Mild", "Moderate" or "Severe"
  pub severity: String,
  /// Wall-clock time, "HH:MM"
  pub time: String,
  /// "YYYY-MM-DD"
  pub date: String,
  /// "Morning", "Afternoon", "Evening" or "Night"
  pub time_of_day: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(default)]
  pub triggers: Vec<String>,
  #[serde(default)]
  pub associated_symptoms: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub health_context: Option<Value>,
}

impl SymptomRecord {
  /// A record stamped with the current local date and time.
  pub fn now(symptom: impl Into<String>, severity: impl Into<String>) -> Self {
    let now = Local::now();
    Self {
      symptom: symptom.into(),
      severity: severity.into(),
      time: now.format("%H:%M").to_string(),
      date: now.format("%Y-%m-%d").to_string(),
      time_of_day: time_of_day(now.hour()).to_string(),
      duration: None,
      notes: None,
      triggers: Vec::new(),
      associated_symptoms: Vec::new(),
      health_context: None,
    }
  }
}

/// Bucket an hour of the day the way the symptom form does.
pub fn time_of_day(hour: u32) -> &'static str {
  match hour {
    5..=11 => "Morning",
    12..=16 => "Afternoon",
    17..=20 => "Evening",
    _ => "Night",
  }
}

/// Metrics accepted by `POST prediction`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthMetrics {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub age: Option<u32>,
  #[serde(rename = "BMI", default, skip_serializing_if = "Option::is_none")]
  pub bmi: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub glucose: Option<f64>,
  /// Systolic blood pressure
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sbp: Option<f64>,
  /// Diastolic blood pressure
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dbp: Option<f64>,
}

/// Input for `POST ai/insights`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequest {
  pub symptom: SymptomRecord,
  #[serde(default)]
  pub health_metrics: Value,
}

/// Query for `GET biorhythm/advice`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BiorhythmQuery {
  /// e.g. "morning", "evening"
  pub chronotype: String,
  pub medication_time: String,
}

/// Error body returned by the backend on non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
  pub detail: Option<String>,
}
