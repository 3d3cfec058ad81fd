use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Submission mode. Determines required fields, the external predictor
/// endpoint, and the persisted record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Simple,
    Clinical,
    Image,
    Combined,
}

impl InputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMode::Simple => "simple",
            InputMode::Clinical => "clinical",
            InputMode::Image => "image",
            InputMode::Combined => "combined",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(InputMode::Simple),
            "clinical" => Ok(InputMode::Clinical),
            "image" => Ok(InputMode::Image),
            "combined" => Ok(InputMode::Combined),
            _ => Err(()),
        }
    }
}

/// One contributing-feature explanation from the predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopFactor {
    pub feature: String,
    pub impact: f64,
    pub direction: String,
}

/// Diet/exercise guidance pair, selected from one of three fixed tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendations {
    pub diet: String,
    pub exercise: String,
}

/// Enriched prediction result: predictor output plus derived
/// recommendations. Field names are part of the client wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutput {
    pub probability: f64,
    pub risk_level: String,
    #[serde(default)]
    pub top_factors: Vec<TopFactor>,
    #[serde(default)]
    pub narration: String,
    pub recommendations: Recommendations,
}

/// Raw bytes of an uploaded ultrasound image, as received from the
/// multipart request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub data: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// A persisted prediction request. `raw_input` is immutable after
/// creation; `prediction_output` is written exactly once, at enrichment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub owner_id: String,
    #[serde(rename = "inputMode")]
    pub mode: InputMode,
    pub raw_input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_storage_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(rename = "modelOutput")]
    pub prediction_output: Option<PredictionOutput>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// New submission with a fresh id and creation timestamp. Image
    /// metadata is attached separately for the image-bearing modes.
    pub fn new(owner_id: &str, mode: InputMode, raw_input: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            mode,
            raw_input,
            image_url: None,
            image_storage_id: None,
            original_name: None,
            mime_type: None,
            size_bytes: None,
            prediction_output: None,
            created_at: Utc::now(),
        }
    }

    /// Creation timestamp in the fixed-width form stored in the database
    /// (microsecond precision keeps lexicographic and chronological order
    /// in agreement).
    pub fn created_at_str(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Body of a successful prediction response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub message: String,
    pub submission_id: String,
    pub input_mode: InputMode,
    pub ml_result: PredictionOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub report: Option<ReportPayload>,
}

/// Embedded PDF report. `report` is null in the response whenever
/// generation failed; a prediction without a report is still a success.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub filename: String,
    pub mime_type: String,
    pub base64: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_mode_round_trips_through_str() {
        for mode in [
            InputMode::Simple,
            InputMode::Clinical,
            InputMode::Image,
            InputMode::Combined,
        ] {
            assert_eq!(mode.as_str().parse::<InputMode>(), Ok(mode));
        }
        assert!("fusion".parse::<InputMode>().is_err());
    }

    #[test]
    fn submission_serializes_with_wire_names() {
        let s = Submission::new("user-1", InputMode::Simple, serde_json::json!({"age": 28}));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["inputMode"], "simple");
        assert_eq!(json["ownerId"], "user-1");
        assert_eq!(json["rawInput"]["age"], 28);
        assert!(json["modelOutput"].is_null());
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn created_at_str_is_fixed_width() {
        let s = Submission::new("user-1", InputMode::Simple, Value::Null);
        let t = s.created_at_str();
        assert!(t.ends_with('Z'));
        assert_eq!(t.len(), "2026-01-01T00:00:00.000000Z".len());
    }

    #[test]
    fn prediction_output_tolerates_missing_optionals() {
        let json = serde_json::json!({
            "probability": 0.4,
            "risk_level": "Moderate",
            "recommendations": {"diet": "d", "exercise": "e"}
        });
        let out: PredictionOutput = serde_json::from_value(json).unwrap();
        assert!(out.top_factors.is_empty());
        assert!(out.narration.is_empty());
    }
}
