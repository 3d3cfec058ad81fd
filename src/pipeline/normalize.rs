//! Normalization of heterogeneous client input into canonical values.
//!
//! Clients send boolean-like symptom flags as booleans, numbers, or text
//! ("yes", "N", "1"). Historical payloads depend on the lax coercion rules
//! here, so `to_binary` is total: unrecognized shapes fall back to truthy
//! coercion instead of erroring.

use serde_json::Value;

const AFFIRMATIVE: [&str; 4] = ["1", "true", "yes", "y"];
const NEGATIVE: [&str; 4] = ["0", "false", "no", "n"];

/// Collapse a boolean-like JSON value to 0 or 1.
///
/// Booleans and numbers map by truthiness; strings are trimmed and
/// lowercased, then matched against the affirmative/negative sets. Anything
/// else (including unmatched strings) falls back to truthy coercion:
/// non-empty/non-zero → 1. Total over all JSON values; never errors.
pub fn to_binary(value: &Value) -> u8 {
    match value {
        Value::Bool(b) => u8::from(*b),
        Value::Number(n) => u8::from(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            if AFFIRMATIVE.contains(&s.as_str()) {
                1
            } else if NEGATIVE.contains(&s.as_str()) {
                0
            } else {
                // Fallback branch: plain truthiness for unrecognized text.
                u8::from(!s.is_empty())
            }
        }
        Value::Null => 0,
        Value::Array(_) | Value::Object(_) => 1,
    }
}

/// Numeric coercion with the same semantics clients already rely on:
/// null → 0, booleans → 0/1, strings are trimmed and parsed (empty → 0,
/// unparsable → NaN), composites → NaN.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Optional-lab coercion. Absent, null, and empty-string all mean "not
/// provided". Present values go through `to_number` without a finiteness
/// check: a non-numeric lab string yields NaN here, unlike the combined
/// feature validator which rejects it. That asymmetry is intentional.
pub fn to_nullable_number(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(to_number(v)),
    }
}

/// JSON has no NaN/Infinity; non-finite numbers serialize as null, which is
/// what the lax lab path has always put on the wire.
pub fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_binary_booleans_and_numbers() {
        assert_eq!(to_binary(&json!(true)), 1);
        assert_eq!(to_binary(&json!(false)), 0);
        assert_eq!(to_binary(&json!(1)), 1);
        assert_eq!(to_binary(&json!(0)), 0);
        assert_eq!(to_binary(&json!(-3.5)), 1);
    }

    #[test]
    fn to_binary_recognized_strings() {
        for v in ["1", "true", "yes", "y", " YES ", "Y"] {
            assert_eq!(to_binary(&json!(v)), 1, "{v:?}");
        }
        for v in ["0", "false", "no", "n", " No ", "N"] {
            assert_eq!(to_binary(&json!(v)), 0, "{v:?}");
        }
    }

    #[test]
    fn to_binary_fallback_is_truthy() {
        assert_eq!(to_binary(&json!("maybe")), 1);
        assert_eq!(to_binary(&json!("")), 0);
        assert_eq!(to_binary(&json!("   ")), 0);
        assert_eq!(to_binary(&json!(null)), 0);
        assert_eq!(to_binary(&json!({"a": 1})), 1);
        assert_eq!(to_binary(&json!([])), 1);
    }

    #[test]
    fn to_binary_is_total_over_representative_inputs() {
        // Every result is exactly 0 or 1; nothing panics.
        for v in [
            json!(true),
            json!(false),
            json!(0),
            json!(1),
            json!("1"),
            json!("0"),
            json!("true"),
            json!("false"),
            json!("yes"),
            json!("no"),
            json!("y"),
            json!("n"),
            json!("garbage"),
            json!({"nested": true}),
        ] {
            assert!(to_binary(&v) <= 1);
        }
    }

    #[test]
    fn to_number_coercion() {
        assert_eq!(to_number(&json!(12.5)), 12.5);
        assert_eq!(to_number(&json!("28")), 28.0);
        assert_eq!(to_number(&json!(" 28 ")), 28.0);
        assert_eq!(to_number(&json!("")), 0.0);
        assert_eq!(to_number(&json!(null)), 0.0);
        assert_eq!(to_number(&json!(true)), 1.0);
        assert!(to_number(&json!("abc")).is_nan());
        assert!(to_number(&json!({})).is_nan());
    }

    #[test]
    fn to_nullable_number_absent_forms() {
        assert_eq!(to_nullable_number(None), None);
        assert_eq!(to_nullable_number(Some(&json!(null))), None);
        assert_eq!(to_nullable_number(Some(&json!(""))), None);
        assert_eq!(to_nullable_number(Some(&json!("  "))), None);
    }

    #[test]
    fn to_nullable_number_keeps_nan_for_bad_labs() {
        assert_eq!(to_nullable_number(Some(&json!("4.2"))), Some(4.2));
        assert!(to_nullable_number(Some(&json!("high"))).unwrap().is_nan());
    }

    #[test]
    fn json_number_maps_non_finite_to_null() {
        assert_eq!(json_number(1.5), json!(1.5));
        assert_eq!(json_number(f64::NAN), Value::Null);
        assert_eq!(json_number(f64::INFINITY), Value::Null);
    }
}
