//! HTTP client for the external PCOS prediction service.
//!
//! Payload field names are part of the external model contract and are
//! reproduced verbatim. Calls are not retried; a failure surfaces with the
//! upstream body attached for diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{TopFactor, UploadedImage};
use crate::pipeline::validate::CombinedClinical;

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("Cannot reach prediction service at {0}")]
    Connection(String),
    #[error("Prediction request timed out after {0}s")]
    Timeout(u64),
    #[error("Prediction service error (status {status})")]
    Upstream { status: u16, body: String },
    #[error("Invalid prediction payload: {0}")]
    Request(String),
    #[error("Cannot parse prediction response: {0}")]
    ResponseParsing(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

impl PredictorError {
    /// Upstream error body, parsed as JSON when possible, for forwarding to
    /// the caller.
    pub fn upstream_detail(&self) -> Option<Value> {
        match self {
            PredictorError::Upstream { body, .. } => Some(
                serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone())),
            ),
            _ => None,
        }
    }
}

/// Client for the four mode-specific prediction endpoints.
#[derive(Debug)]
pub struct PredictorClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl PredictorClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    pub async fn predict_simple(
        &self,
        payload: &SimplePayload,
    ) -> Result<PredictorResponse, PredictorError> {
        self.post_json("/predict/simple", payload).await
    }

    pub async fn predict_clinical(
        &self,
        payload: &ClinicalPayload,
    ) -> Result<PredictorResponse, PredictorError> {
        self.post_json("/predict/clinical", payload).await
    }

    /// Image-only prediction: the raw ultrasound bytes go up as a multipart
    /// `image` field, mirroring the inbound request.
    pub async fn predict_image(
        &self,
        image: &UploadedImage,
    ) -> Result<PredictorResponse, PredictorError> {
        let form = reqwest::multipart::Form::new().part("image", image_part(image)?);
        self.post_multipart("/predict/image", form).await
    }

    /// Fusion prediction: multipart `image` plus the validated 19-feature
    /// panel as a JSON-string `clinical` field.
    pub async fn predict_combined(
        &self,
        image: &UploadedImage,
        clinical: &CombinedClinical,
    ) -> Result<PredictorResponse, PredictorError> {
        let clinical_json = serde_json::to_string(clinical)
            .map_err(|e| PredictorError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("image", image_part(image)?)
            .text("clinical", clinical_json);
        self.post_multipart("/predict/combined", form).await
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<PredictorResponse, PredictorError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.parse_response(response).await
    }

    async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<PredictorResponse, PredictorError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.parse_response(response).await
    }

    fn map_send_error(&self, e: reqwest::Error) -> PredictorError {
        if e.is_connect() {
            PredictorError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            PredictorError::Timeout(self.timeout_secs)
        } else {
            PredictorError::Http(e.to_string())
        }
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
    ) -> Result<PredictorResponse, PredictorError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictorError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| PredictorError::ResponseParsing(e.to_string()))
    }
}

fn image_part(image: &UploadedImage) -> Result<reqwest::multipart::Part, PredictorError> {
    reqwest::multipart::Part::bytes(image.data.clone())
        .file_name(image.filename.clone())
        .mime_str(&image.content_type)
        .map_err(|e| PredictorError::Request(e.to_string()))
}

/// Wire payload for `/predict/simple`. Key names match the external model
/// contract exactly.
#[derive(Debug, Clone, Serialize)]
pub struct SimplePayload {
    pub age_yrs: f64,
    pub bmi: f64,
    pub pulse_rate_bpm: f64,
    pub rr_breaths_min: f64,
    pub hb_g_dl: f64,
    pub cycle_r_i: String,
    pub cycle_length_days: f64,
    pub weight_gain_y_n: u8,
    pub hair_growth_y_n: u8,
    pub skin_darkening_y_n: u8,
    pub hair_loss_y_n: u8,
    pub pimples_y_n: u8,
    pub fast_food_y_n: u8,
    pub reg_exercise_y_n: u8,
    pub bp_systolic_mmhg: f64,
    pub bp_diastolic_mmhg: f64,
}

/// Wire payload for `/predict/clinical`: the simple vitals plus eleven
/// nullable labs. Labs not provided (or non-finite after lax coercion)
/// serialize as null.
#[derive(Debug, Clone, Serialize)]
pub struct ClinicalPayload {
    #[serde(flatten)]
    pub vitals: SimplePayload,
    pub i_beta_hcg_miu_ml: Option<f64>,
    pub ii_beta_hcg_miu_ml: Option<f64>,
    pub fsh_miu_ml: Option<f64>,
    pub lh_miu_ml: Option<f64>,
    pub fsh_lh: Option<f64>,
    pub tsh_miu_l: Option<f64>,
    pub amh_ng_ml: Option<f64>,
    pub prl_ng_ml: Option<f64>,
    pub vit_d3_ng_ml: Option<f64>,
    pub prg_ng_ml: Option<f64>,
    pub rbs_mg_dl: Option<f64>,
}

/// Response shape shared by all four prediction endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorResponse {
    pub probability: f64,
    pub risk_level: String,
    #[serde(default)]
    pub top_factors: Vec<TopFactor>,
    #[serde(default)]
    pub narration: String,
}
