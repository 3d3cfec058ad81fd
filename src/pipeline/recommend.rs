//! Rule-based diet/exercise recommendations.
//!
//! Three fixed tiers. The risk label is matched before the probability
//! thresholds, so a label containing "high" selects the High tier even with
//! a low probability.

use crate::models::Recommendations;

pub const HIGH_DIET: &str = "Strict Low-Glycemic Index (GI) diet. Eliminate processed sugars, white bread, and sugary drinks. Focus on anti-inflammatory foods like fatty fish (salmon), turmeric, ginger, and leafy greens. Consider intermittent fasting (14:10 window) after consulting a doctor.";
pub const HIGH_EXERCISE: &str = "Aim for 45+ minutes of daily activity. Prioritize High-Intensity Interval Training (HIIT) to improve insulin sensitivity and Strength Training (3-4 times/week) to build muscle mass and boost metabolism.";

pub const MODERATE_DIET: &str = "Balanced Plate Method: 50% vegetables, 25% lean protein, 25% high-fiber carbs. Limit dairy and gluten if you notice bloating or acne. Stay hydrated (2-3 liters of water daily) and reduce caffeine intake.";
pub const MODERATE_EXERCISE: &str = "Daily 30-minute moderate cardio (brisk walking, swimming, or cycling). Incorporate resistance training or yoga 2-3 times a week to manage cortisol (stress) levels.";

pub const LOW_DIET: &str = "Maintain a nutrient-dense whole food diet. Focus on fiber-rich fruits, vegetables, and whole grains. Avoid late-night snacking and excessive processed foods to keep hormones balanced.";
pub const LOW_EXERCISE: &str = "Maintain an active lifestyle. Aim for 150 minutes of moderate activity per week (e.g., dancing, hiking, yoga). Regular stretching is recommended to maintain flexibility and blood flow.";

/// Select the recommendation tier for a prediction. Pure function.
pub fn derive_recommendations(risk_level: &str, probability: f64) -> Recommendations {
    let prob = if probability.is_finite() { probability } else { 0.0 };
    let risk = risk_level.to_lowercase();

    if risk.contains("high") || prob >= 0.7 {
        Recommendations {
            diet: HIGH_DIET.to_string(),
            exercise: HIGH_EXERCISE.to_string(),
        }
    } else if risk.contains("moderate") || (0.35..0.7).contains(&prob) {
        Recommendations {
            diet: MODERATE_DIET.to_string(),
            exercise: MODERATE_EXERCISE.to_string(),
        }
    } else {
        Recommendations {
            diet: LOW_DIET.to_string(),
            exercise: LOW_EXERCISE.to_string(),
        }
    }
}
