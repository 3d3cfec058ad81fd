//! Per-mode request validation.
//!
//! Rejections identify exactly one cause; required fields are checked in
//! declaration order so the first missing field always wins. Vitals range
//! limits are enforced by the database schema, not duplicated here.

use serde_json::Value;
use thiserror::Error;

use crate::pipeline::normalize::to_number;

/// The 16 vital/symptom keys required in Simple and Clinical mode, in the
/// order they are reported on failure.
pub const REQUIRED_VITALS: [&str; 16] = [
    "age",
    "bmi",
    "pulseRate",
    "respiratoryRate",
    "hemoglobin",
    "menstrualCycleType",
    "averageCycleLength",
    "weightGain",
    "hairGrowth",
    "skinDarkening",
    "hairLoss",
    "pimples",
    "fastFood",
    "regularExercise",
    "bpSystolic",
    "bpDiastolic",
];

/// Optional lab keys accepted in Clinical mode. No presence requirement.
pub const OPTIONAL_LABS: [&str; 11] = [
    "B_HCG_Test1",
    "B_HCG_Test2",
    "FSH",
    "LH",
    "FSHLH_Ratio",
    "TSH",
    "AMH",
    "prolactin",
    "vitaminD3",
    "progesterone",
    "randomBloodSugar",
];

/// The 19 clinical features of the combined (image + labs) model, in the
/// order fixed by the external model contract.
pub const REQUIRED_COMBINED_KEYS: [&str; 19] = [
    "age_yrs",
    "weight_kg",
    "height_cm",
    "bmi",
    "pulse_rate_bpm",
    "hb_g_dl",
    "cycle_length_days",
    "fsh_miu_ml",
    "lh_miu_ml",
    "fsh_lh",
    "hip_inch",
    "waist_inch",
    "tsh_miu_l",
    "amh_ng_ml",
    "prl_ng_ml",
    "vit_d3_ng_ml",
    "follicle_no_l",
    "follicle_no_r",
    "endometrium_mm",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("menstrualCycleType must be 2 (Regular) or 4 (Irregular)")]
    InvalidCycleType,
    #[error("Image file is required (field name: image)")]
    MissingImage,
    #[error("Invalid clinical JSON")]
    InvalidClinicalJson,
    #[error("Missing required clinical field: {0}")]
    MissingClinicalField(&'static str),
    #[error("Invalid clinical value for: {0}")]
    InvalidClinicalValue(&'static str),
}

/// Presence check for the 16 required vitals. Only strict null/absent
/// rejects; an empty string counts as present.
pub fn require_vitals(body: &Value) -> Result<(), ValidationError> {
    for key in REQUIRED_VITALS {
        match body.get(key) {
            None | Some(Value::Null) => return Err(ValidationError::MissingField(key)),
            Some(_) => {}
        }
    }
    Ok(())
}

/// Coerce `menstrualCycleType` to its string form and check it against the
/// two admitted cycle codes.
pub fn cycle_type(body: &Value) -> Result<String, ValidationError> {
    let raw = body.get("menstrualCycleType").unwrap_or(&Value::Null);
    let s = match raw {
        Value::String(s) => s.clone(),
        // Whole floats stringify without the fraction, so 2.0 reads as "2".
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.is_finite() => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    };
    if s == "2" || s == "4" {
        Ok(s)
    } else {
        Err(ValidationError::InvalidCycleType)
    }
}

/// The validated 19-feature clinical panel of the combined model. Field
/// order matches the external contract; serialization reproduces the
/// snake_case keys verbatim.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CombinedClinical {
    pub age_yrs: f64,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub bmi: f64,
    pub pulse_rate_bpm: f64,
    pub hb_g_dl: f64,
    pub cycle_length_days: f64,
    pub fsh_miu_ml: f64,
    pub lh_miu_ml: f64,
    pub fsh_lh: f64,
    pub hip_inch: f64,
    pub waist_inch: f64,
    pub tsh_miu_l: f64,
    pub amh_ng_ml: f64,
    pub prl_ng_ml: f64,
    pub vit_d3_ng_ml: f64,
    pub follicle_no_l: f64,
    pub follicle_no_r: f64,
    pub endometrium_mm: f64,
}

/// Parse and validate the multipart `clinical` field of a combined-mode
/// request. A JSON parse failure and a missing/invalid feature are distinct
/// rejection reasons; features are checked in contract order and each must
/// coerce to a finite number.
pub fn parse_combined_clinical(raw: &str) -> Result<CombinedClinical, ValidationError> {
    let parsed: Value =
        serde_json::from_str(raw).map_err(|_| ValidationError::InvalidClinicalJson)?;

    let mut values = [0.0_f64; 19];
    for (i, key) in REQUIRED_COMBINED_KEYS.iter().enumerate() {
        let field = parsed.get(*key);
        match field {
            None | Some(Value::Null) => return Err(ValidationError::MissingClinicalField(key)),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(ValidationError::MissingClinicalField(key))
            }
            Some(v) => {
                let num = to_number(v);
                if !num.is_finite() {
                    return Err(ValidationError::InvalidClinicalValue(key));
                }
                values[i] = num;
            }
        }
    }

    Ok(CombinedClinical {
        age_yrs: values[0],
        weight_kg: values[1],
        height_cm: values[2],
        bmi: values[3],
        pulse_rate_bpm: values[4],
        hb_g_dl: values[5],
        cycle_length_days: values[6],
        fsh_miu_ml: values[7],
        lh_miu_ml: values[8],
        fsh_lh: values[9],
        hip_inch: values[10],
        waist_inch: values[11],
        tsh_miu_l: values[12],
        amh_ng_ml: values[13],
        prl_ng_ml: values[14],
        vit_d3_ng_ml: values[15],
        follicle_no_l: values[16],
        follicle_no_r: values[17],
        endometrium_mm: values[18],
    })
}

impl CombinedClinical {
    /// Snapshot of the validated panel as a JSON object, used for the
    /// persisted `raw_input` and the report input table.
    pub fn to_snapshot(&self) -> Value {
        serde_json::to_value(self).expect("finite panel serializes")
    }
}
