//! Chart specification for the report's factor breakdown.
//!
//! The chart service renders a declarative chart.js-style spec passed as
//! URL-embedded JSON and returns a raster image.

use serde_json::{json, Value};

use crate::models::TopFactor;

/// Bars for raised-risk factors vs. lowered-risk factors.
const COLOR_RAISES: &str = "rgba(214, 69, 65, 0.85)";
const COLOR_LOWERS: &str = "rgba(38, 140, 88, 0.85)";

/// How many factors the chart shows, ranked by absolute impact.
pub const CHART_TOP_N: usize = 5;

/// Build the bar-chart spec for the top contributing factors.
pub fn chart_spec(factors: &[TopFactor]) -> Value {
    let mut ranked: Vec<&TopFactor> = factors.iter().collect();
    ranked.sort_by(|a, b| {
        b.impact
            .abs()
            .partial_cmp(&a.impact.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(CHART_TOP_N);

    let labels: Vec<&str> = ranked.iter().map(|f| f.feature.as_str()).collect();
    let data: Vec<f64> = ranked.iter().map(|f| f.impact).collect();
    let colors: Vec<&str> = ranked
        .iter()
        .map(|f| if f.impact >= 0.0 { COLOR_RAISES } else { COLOR_LOWERS })
        .collect();

    json!({
        "type": "bar",
        "data": {
            "labels": labels,
            "datasets": [{
                "label": "Impact",
                "data": data,
                "backgroundColor": colors,
            }],
        },
        "options": {
            "indexAxis": "y",
            "plugins": {
                "legend": { "display": false },
                "title": { "display": true, "text": "Top Contributing Factors" },
            },
        },
    })
}
