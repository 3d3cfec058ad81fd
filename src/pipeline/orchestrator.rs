//! Submission orchestration, one entry point per mode.
//!
//! Each request runs the same staged pipeline:
//! validate → (store image) → persist raw → predict → enrich →
//! persist prediction → best-effort report → respond.
//!
//! Validation and configuration failures abort with no side effects. An
//! image-upload failure aborts before any database write. A predictor
//! failure aborts after the raw submission is persisted; the record stays,
//! unenriched. Report generation can only degrade the response, never fail
//! it.

use std::sync::MutexGuard;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::Connection;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::submission as submissions;
use crate::models::{
    InputMode, PredictionOutput, PredictionResponse, ReportPayload, Submission, UploadedImage,
};
use crate::object_storage::StorageError;
use crate::pipeline::normalize::{json_number, to_binary, to_number, to_nullable_number};
use crate::pipeline::predictor::{ClinicalPayload, PredictorError, PredictorResponse, SimplePayload};
use crate::pipeline::recommend::derive_recommendations;
use crate::pipeline::validate::{self, ValidationError};
use crate::report::ReportRequest;

/// Simple mode: 16 vitals/symptom fields as a JSON body.
pub async fn submit_simple(
    ctx: &ApiContext,
    owner_id: &str,
    body: &Value,
) -> Result<PredictionResponse, ApiError> {
    validate::require_vitals(body)?;
    let cycle = validate::cycle_type(body)?;
    let predictor = ctx.predictor()?;

    let vitals = NormalizedVitals::from_body(body, cycle);
    let submission = Submission::new(owner_id, InputMode::Simple, vitals.snapshot());
    persist(ctx, &submission)?;

    let ml = predictor
        .predict_simple(&vitals.payload())
        .await
        .map_err(|e| predictor_failure(InputMode::Simple, e))?;
    let output = enrich(ml);
    store_prediction(ctx, &submission.id, &output)?;

    let report = best_effort_report(ctx, &submission, &output, &submission.raw_input).await;
    Ok(compose_response(submission, output, report))
}

/// Clinical mode: the simple vitals plus eleven optional lab values.
pub async fn submit_clinical(
    ctx: &ApiContext,
    owner_id: &str,
    body: &Value,
) -> Result<PredictionResponse, ApiError> {
    validate::require_vitals(body)?;
    let cycle = validate::cycle_type(body)?;
    let predictor = ctx.predictor()?;

    let vitals = NormalizedVitals::from_body(body, cycle);
    let labs = NormalizedLabs::from_body(body);
    let submission = Submission::new(owner_id, InputMode::Clinical, labs.extend(vitals.snapshot()));
    persist(ctx, &submission)?;

    let payload = ClinicalPayload {
        vitals: vitals.payload(),
        i_beta_hcg_miu_ml: wire_lab(labs.beta_hcg_1),
        ii_beta_hcg_miu_ml: wire_lab(labs.beta_hcg_2),
        fsh_miu_ml: wire_lab(labs.fsh),
        lh_miu_ml: wire_lab(labs.lh),
        fsh_lh: wire_lab(labs.fsh_lh_ratio),
        tsh_miu_l: wire_lab(labs.tsh),
        amh_ng_ml: wire_lab(labs.amh),
        prl_ng_ml: wire_lab(labs.prolactin),
        vit_d3_ng_ml: wire_lab(labs.vitamin_d3),
        prg_ng_ml: wire_lab(labs.progesterone),
        rbs_mg_dl: wire_lab(labs.rbs),
    };
    let ml = predictor
        .predict_clinical(&payload)
        .await
        .map_err(|e| predictor_failure(InputMode::Clinical, e))?;
    let output = enrich(ml);
    store_prediction(ctx, &submission.id, &output)?;

    let report = best_effort_report(ctx, &submission, &output, &submission.raw_input).await;
    Ok(compose_response(submission, output, report))
}

/// Image mode: a single ultrasound attachment.
pub async fn submit_image(
    ctx: &ApiContext,
    owner_id: &str,
    image: Option<UploadedImage>,
) -> Result<PredictionResponse, ApiError> {
    let image = image.ok_or(ValidationError::MissingImage)?;
    let predictor = ctx.predictor()?;
    let storage = ctx.storage()?;

    let stored = storage
        .store(&image, ctx.config.storage_folder(InputMode::Image))
        .await
        .map_err(storage_failure)?;

    let submission = image_submission(
        owner_id,
        InputMode::Image,
        json!({ "originalName": image.filename }),
        &image,
        stored.url,
        stored.storage_id,
    );
    persist(ctx, &submission)?;

    let ml = predictor
        .predict_image(&image)
        .await
        .map_err(|e| predictor_failure(InputMode::Image, e))?;
    let output = enrich(ml);
    store_prediction(ctx, &submission.id, &output)?;

    let report = best_effort_report(ctx, &submission, &output, &submission.raw_input).await;
    Ok(compose_response(submission, output, report))
}

/// Combined mode: ultrasound attachment plus the 19-feature clinical panel
/// passed as a JSON string.
pub async fn submit_combined(
    ctx: &ApiContext,
    owner_id: &str,
    image: Option<UploadedImage>,
    clinical_raw: Option<String>,
) -> Result<PredictionResponse, ApiError> {
    let image = image.ok_or(ValidationError::MissingImage)?;
    let clinical = validate::parse_combined_clinical(clinical_raw.as_deref().unwrap_or("{}"))?;
    let predictor = ctx.predictor()?;
    let storage = ctx.storage()?;

    let stored = storage
        .store(&image, ctx.config.storage_folder(InputMode::Combined))
        .await
        .map_err(storage_failure)?;

    let panel = clinical.to_snapshot();
    let submission = image_submission(
        owner_id,
        InputMode::Combined,
        json!({ "clinical": panel.clone() }),
        &image,
        stored.url,
        stored.storage_id,
    );
    persist(ctx, &submission)?;

    let ml = predictor
        .predict_combined(&image, &clinical)
        .await
        .map_err(|e| predictor_failure(InputMode::Combined, e))?;
    let output = enrich(ml);
    store_prediction(ctx, &submission.id, &output)?;

    // The report table prints the panel flat; the record nests it.
    let report = best_effort_report(ctx, &submission, &output, &panel).await;
    Ok(compose_response(submission, output, report))
}

// ─── Pipeline stages ──────────────────────────────────────────────────────────

fn enrich(ml: PredictorResponse) -> PredictionOutput {
    let recommendations = derive_recommendations(&ml.risk_level, ml.probability);
    PredictionOutput {
        probability: ml.probability,
        risk_level: ml.risk_level,
        top_factors: ml.top_factors,
        narration: ml.narration,
        recommendations,
    }
}

fn lock_db(ctx: &ApiContext) -> Result<MutexGuard<'_, Connection>, ApiError> {
    ctx.db
        .lock()
        .map_err(|_| ApiError::Internal("database lock poisoned".into()))
}

fn persist(ctx: &ApiContext, submission: &Submission) -> Result<(), ApiError> {
    let conn = lock_db(ctx)?;
    submissions::insert_submission(&conn, submission)?;
    Ok(())
}

fn store_prediction(
    ctx: &ApiContext,
    id: &str,
    output: &PredictionOutput,
) -> Result<(), ApiError> {
    let conn = lock_db(ctx)?;
    submissions::attach_prediction(&conn, id, output)?;
    Ok(())
}

/// Report generation is best-effort: any failure is logged and the response
/// simply carries `report: null`.
///
/// The snapshot printed in the report is passed separately from the
/// persisted raw input: combined mode persists its panel nested under
/// `clinical` but prints it flat.
async fn best_effort_report(
    ctx: &ApiContext,
    submission: &Submission,
    output: &PredictionOutput,
    input_snapshot: &Value,
) -> Option<ReportPayload> {
    let request = ReportRequest {
        mode: submission.mode,
        submission_id: &submission.id,
        result: output,
        input_snapshot,
        image_url: submission.image_url.as_deref(),
    };
    match ctx.report.generate(&request).await {
        Ok(bytes) => Some(ReportPayload {
            filename: format!("PCOSmart_{}_{}.pdf", submission.mode, submission.id),
            mime_type: "application/pdf".to_string(),
            base64: BASE64.encode(&bytes),
        }),
        Err(e) => {
            tracing::error!(error = %e, mode = %submission.mode, "PDF generation failed");
            None
        }
    }
}

fn compose_response(
    submission: Submission,
    output: PredictionOutput,
    report: Option<ReportPayload>,
) -> PredictionResponse {
    PredictionResponse {
        message: "Prediction completed".to_string(),
        submission_id: submission.id,
        input_mode: submission.mode,
        ml_result: output,
        image_url: submission.image_url,
        report,
    }
}

fn image_submission(
    owner_id: &str,
    mode: InputMode,
    raw_input: Value,
    image: &UploadedImage,
    url: String,
    storage_id: String,
) -> Submission {
    let mut submission = Submission::new(owner_id, mode, raw_input);
    submission.image_url = Some(url);
    submission.image_storage_id = Some(storage_id);
    submission.original_name = Some(image.filename.clone());
    submission.mime_type = Some(image.content_type.clone());
    submission.size_bytes = Some(image.data.len() as i64);
    submission
}

fn predictor_failure(mode: InputMode, err: PredictorError) -> ApiError {
    let detail = err
        .upstream_detail()
        .unwrap_or_else(|| Value::String(err.to_string()));
    ApiError::Upstream {
        message: format!("Failed to process {mode} model request"),
        detail: Some(detail),
    }
}

fn storage_failure(err: StorageError) -> ApiError {
    let detail = match &err {
        StorageError::Upstream { body, .. } => {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone()))
        }
        other => Value::String(other.to_string()),
    };
    ApiError::Upstream {
        message: "Failed to store ultrasound image".to_string(),
        detail: Some(detail),
    }
}

/// A lab goes on the wire as null when absent or when lax coercion produced
/// a non-finite value (JSON cannot carry NaN).
fn wire_lab(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

// ─── Normalized input shapes ──────────────────────────────────────────────────

/// The 16 vitals after coercion, ready for both persistence and the wire.
struct NormalizedVitals {
    age: f64,
    bmi: f64,
    pulse_rate: f64,
    respiratory_rate: f64,
    hemoglobin: f64,
    cycle: String,
    average_cycle_length: f64,
    weight_gain: u8,
    hair_growth: u8,
    skin_darkening: u8,
    hair_loss: u8,
    pimples: u8,
    fast_food: u8,
    regular_exercise: u8,
    bp_systolic: f64,
    bp_diastolic: f64,
}

impl NormalizedVitals {
    fn from_body(body: &Value, cycle: String) -> Self {
        Self {
            age: field(body, "age"),
            bmi: field(body, "bmi"),
            pulse_rate: field(body, "pulseRate"),
            respiratory_rate: field(body, "respiratoryRate"),
            hemoglobin: field(body, "hemoglobin"),
            cycle,
            average_cycle_length: field(body, "averageCycleLength"),
            weight_gain: flag(body, "weightGain"),
            hair_growth: flag(body, "hairGrowth"),
            skin_darkening: flag(body, "skinDarkening"),
            hair_loss: flag(body, "hairLoss"),
            pimples: flag(body, "pimples"),
            fast_food: flag(body, "fastFood"),
            regular_exercise: flag(body, "regularExercise"),
            bp_systolic: field(body, "bpSystolic"),
            bp_diastolic: field(body, "bpDiastolic"),
        }
    }

    /// Persisted record shape: camelCase keys, booleans for the flags.
    fn snapshot(&self) -> Value {
        json!({
            "age": json_number(self.age),
            "bmi": json_number(self.bmi),
            "pulseRate": json_number(self.pulse_rate),
            "respiratoryRate": json_number(self.respiratory_rate),
            "hemoglobin": json_number(self.hemoglobin),
            "menstrualCycleType": self.cycle.parse::<i64>().unwrap_or_default(),
            "averageCycleLength": json_number(self.average_cycle_length),
            "weightGain": self.weight_gain == 1,
            "hairGrowth": self.hair_growth == 1,
            "skinDarkening": self.skin_darkening == 1,
            "hairLoss": self.hair_loss == 1,
            "pimples": self.pimples == 1,
            "fastFood": self.fast_food == 1,
            "regularExercise": self.regular_exercise == 1,
            "bpSystolic": json_number(self.bp_systolic),
            "bpDiastolic": json_number(self.bp_diastolic),
        })
    }

    fn payload(&self) -> SimplePayload {
        SimplePayload {
            age_yrs: self.age,
            bmi: self.bmi,
            pulse_rate_bpm: self.pulse_rate,
            rr_breaths_min: self.respiratory_rate,
            hb_g_dl: self.hemoglobin,
            cycle_r_i: self.cycle.clone(),
            cycle_length_days: self.average_cycle_length,
            weight_gain_y_n: self.weight_gain,
            hair_growth_y_n: self.hair_growth,
            skin_darkening_y_n: self.skin_darkening,
            hair_loss_y_n: self.hair_loss,
            pimples_y_n: self.pimples,
            fast_food_y_n: self.fast_food,
            reg_exercise_y_n: self.regular_exercise,
            bp_systolic_mmhg: self.bp_systolic,
            bp_diastolic_mmhg: self.bp_diastolic,
        }
    }
}

/// The eleven optional labs of Clinical mode. No finiteness check here;
/// the lax coercion path is part of the observed contract.
struct NormalizedLabs {
    beta_hcg_1: Option<f64>,
    beta_hcg_2: Option<f64>,
    fsh: Option<f64>,
    lh: Option<f64>,
    fsh_lh_ratio: Option<f64>,
    tsh: Option<f64>,
    amh: Option<f64>,
    prolactin: Option<f64>,
    vitamin_d3: Option<f64>,
    progesterone: Option<f64>,
    rbs: Option<f64>,
}

impl NormalizedLabs {
    fn from_body(body: &Value) -> Self {
        Self {
            beta_hcg_1: to_nullable_number(body.get("B_HCG_Test1")),
            beta_hcg_2: to_nullable_number(body.get("B_HCG_Test2")),
            fsh: to_nullable_number(body.get("FSH")),
            lh: to_nullable_number(body.get("LH")),
            fsh_lh_ratio: to_nullable_number(body.get("FSHLH_Ratio")),
            tsh: to_nullable_number(body.get("TSH")),
            amh: to_nullable_number(body.get("AMH")),
            prolactin: to_nullable_number(body.get("prolactin")),
            vitamin_d3: to_nullable_number(body.get("vitaminD3")),
            progesterone: to_nullable_number(body.get("progesterone")),
            rbs: to_nullable_number(body.get("randomBloodSugar")),
        }
    }

    /// Add the lab columns to a vitals snapshot.
    fn extend(&self, mut snapshot: Value) -> Value {
        if let Some(obj) = snapshot.as_object_mut() {
            obj.insert("betaHcg1".into(), nullable(self.beta_hcg_1));
            obj.insert("betaHcg2".into(), nullable(self.beta_hcg_2));
            obj.insert("fsh".into(), nullable(self.fsh));
            obj.insert("lh".into(), nullable(self.lh));
            obj.insert("fshLhRatio".into(), nullable(self.fsh_lh_ratio));
            obj.insert("tsh".into(), nullable(self.tsh));
            obj.insert("amh".into(), nullable(self.amh));
            obj.insert("prolactin".into(), nullable(self.prolactin));
            obj.insert("vitaminD3".into(), nullable(self.vitamin_d3));
            obj.insert("progesterone".into(), nullable(self.progesterone));
            obj.insert("rbs".into(), nullable(self.rbs));
        }
        snapshot
    }
}

fn field(body: &Value, key: &str) -> f64 {
    to_number(body.get(key).unwrap_or(&Value::Null))
}

fn flag(body: &Value, key: &str) -> u8 {
    to_binary(body.get(key).unwrap_or(&Value::Null))
}

fn nullable(value: Option<f64>) -> Value {
    value.map(json_number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simple_body() -> Value {
        json!({
            "age": 28, "bmi": 24.5, "pulseRate": 72, "respiratoryRate": 16,
            "hemoglobin": 12.5, "menstrualCycleType": "2", "averageCycleLength": 28,
            "weightGain": "yes", "hairGrowth": false, "skinDarkening": 0,
            "hairLoss": "n", "pimples": 1, "fastFood": true, "regularExercise": "no",
            "bpSystolic": 118, "bpDiastolic": 76
        })
    }

    #[test]
    fn vitals_normalize_mixed_flag_shapes() {
        let vitals = NormalizedVitals::from_body(&simple_body(), "2".to_string());
        let payload = vitals.payload();
        assert_eq!(payload.weight_gain_y_n, 1);
        assert_eq!(payload.hair_growth_y_n, 0);
        assert_eq!(payload.skin_darkening_y_n, 0);
        assert_eq!(payload.hair_loss_y_n, 0);
        assert_eq!(payload.pimples_y_n, 1);
        assert_eq!(payload.fast_food_y_n, 1);
        assert_eq!(payload.reg_exercise_y_n, 0);
        assert_eq!(payload.cycle_r_i, "2");
        assert_eq!(payload.age_yrs, 28.0);
    }

    #[test]
    fn snapshot_stores_booleans_and_numeric_cycle() {
        let vitals = NormalizedVitals::from_body(&simple_body(), "2".to_string());
        let snapshot = vitals.snapshot();
        assert_eq!(snapshot["weightGain"], true);
        assert_eq!(snapshot["regularExercise"], false);
        assert_eq!(snapshot["menstrualCycleType"], 2);
        assert_eq!(snapshot["bpSystolic"], 118.0);
    }

    #[test]
    fn labs_extend_snapshot_with_nulls_for_missing() {
        let mut body = simple_body();
        body["FSH"] = json!("6.2");
        body["AMH"] = json!("");
        let labs = NormalizedLabs::from_body(&body);
        let snapshot = labs.extend(NormalizedVitals::from_body(&body, "2".into()).snapshot());
        assert_eq!(snapshot["fsh"], 6.2);
        assert!(snapshot["amh"].is_null());
        assert!(snapshot["tsh"].is_null());
    }

    #[test]
    fn non_numeric_lab_becomes_null_on_the_wire() {
        let labs = NormalizedLabs::from_body(&json!({"TSH": "borderline"}));
        assert!(labs.tsh.unwrap().is_nan());
        assert_eq!(wire_lab(labs.tsh), None);
        assert_eq!(wire_lab(Some(2.1)), Some(2.1));
    }

    #[test]
    fn enrich_attaches_tier_for_predictor_label() {
        let ml = PredictorResponse {
            probability: 0.42,
            risk_level: "Moderate".to_string(),
            top_factors: vec![],
            narration: "n".to_string(),
        };
        let output = enrich(ml);
        assert_eq!(output.risk_level, "Moderate");
        assert_eq!(
            output.recommendations.diet,
            crate::pipeline::recommend::MODERATE_DIET
        );
    }

    #[test]
    fn predictor_failure_forwards_upstream_body() {
        let err = predictor_failure(
            InputMode::Simple,
            PredictorError::Upstream {
                status: 503,
                body: r#"{"detail": "model warming up"}"#.to_string(),
            },
        );
        match err {
            ApiError::Upstream { message, detail } => {
                assert_eq!(message, "Failed to process simple model request");
                assert_eq!(detail.unwrap()["detail"], "model warming up");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}
