//! Screening report synthesis.
//!
//! Builds the multi-section PDF returned alongside a prediction: header,
//! color-coded result box, optional ultrasound image, optional factor
//! chart, narration and recommendations, raw-input snapshot, disclaimer.
//!
//! Every remote asset is fetched behind its own `Result`; a failed fetch
//! degrades that one section (placeholder or omission) and can never fail
//! the document. Only document finalization errors propagate.

pub mod chart;

use std::io::BufWriter;

use printpdf::image_crate;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Polygon, Rgb,
};
use serde_json::Value;
use thiserror::Error;

use crate::models::{InputMode, PredictionOutput, TopFactor};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const TOP_Y: f32 = PAGE_HEIGHT - 20.0;
const BOTTOM_Y: f32 = 20.0;

/// Snapshot values longer than this are cut off in the input table.
const SNAPSHOT_VALUE_MAX_CHARS: usize = 50;

const DISCLAIMER: &str = "This is a screening tool, not a medical diagnosis. \
Please consult a qualified healthcare professional.";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("PDF font error: {0}")]
    Font(String),
    #[error("PDF save error: {0}")]
    Save(String),
}

/// Failure of a single embedded asset. Contained within report generation;
/// never escapes to the request.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset fetch failed: {0}")]
    Fetch(String),
    #[error("asset fetch returned status {0}")]
    Status(u16),
    #[error("asset decode failed: {0}")]
    Decode(String),
}

/// Everything the synthesizer needs about one submission.
pub struct ReportRequest<'a> {
    pub mode: InputMode,
    pub submission_id: &'a str,
    pub result: &'a PredictionOutput,
    pub input_snapshot: &'a Value,
    pub image_url: Option<&'a str>,
}

pub struct ReportGenerator {
    client: reqwest::Client,
    chart_base_url: String,
}

impl ReportGenerator {
    pub fn new(chart_base_url: &str, asset_timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(asset_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            chart_base_url: chart_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Produce the finished PDF as an in-memory buffer.
    ///
    /// The ultrasound image and the chart render are independent; both
    /// fetches run concurrently and the document is assembled once both
    /// have settled.
    pub async fn generate(&self, req: &ReportRequest<'_>) -> Result<Vec<u8>, ReportError> {
        let ultrasound = async {
            match req.image_url {
                Some(url) => Some(self.fetch_asset(url).await),
                None => None,
            }
        };
        let chart = async {
            if req.result.top_factors.is_empty() {
                None
            } else {
                Some(self.fetch_chart(&req.result.top_factors).await)
            }
        };
        let (ultrasound, chart) = tokio::join!(ultrasound, chart);

        if let Some(Err(e)) = &ultrasound {
            tracing::warn!(error = %e, "report: ultrasound image not embedded");
        }
        let chart = match chart {
            Some(Ok(img)) => Some(img),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "report: factor chart omitted");
                None
            }
            None => None,
        };

        render_document(req, ultrasound, chart)
    }

    async fn fetch_asset(&self, url: &str) -> Result<image_crate::DynamicImage, AssetError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AssetError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::Fetch(e.to_string()))?;
        image_crate::load_from_memory(&bytes).map_err(|e| AssetError::Decode(e.to_string()))
    }

    async fn fetch_chart(
        &self,
        factors: &[TopFactor],
    ) -> Result<image_crate::DynamicImage, AssetError> {
        let spec = chart::chart_spec(factors);
        let response = self
            .client
            .get(&self.chart_base_url)
            .query(&[
                ("c", spec.to_string()),
                ("w", "500".to_string()),
                ("h", "300".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AssetError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::Fetch(e.to_string()))?;
        image_crate::load_from_memory(&bytes).map_err(|e| AssetError::Decode(e.to_string()))
    }
}

/// `round(probability * 100)` with a trailing percent sign; anything
/// non-finite formats as 0%.
pub fn format_percent(probability: f64) -> String {
    let p = if probability.is_finite() { probability } else { 0.0 };
    format!("{}%", (p * 100.0).round() as i64)
}

/// Character-safe truncation for snapshot table values.
pub fn truncate_value(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

// ─── Document assembly ────────────────────────────────────────────────────────

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

struct Cursor {
    layer: PdfLayerReference,
    y: f32,
}

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn black() -> Color {
    rgb(0.0, 0.0, 0.0)
}

fn risk_color(risk_level: &str) -> Color {
    let risk = risk_level.to_lowercase();
    if risk.contains("high") {
        rgb(0.78, 0.16, 0.16)
    } else if risk.contains("moderate") {
        rgb(0.85, 0.55, 0.13)
    } else {
        rgb(0.16, 0.55, 0.30)
    }
}

fn new_page(doc: &PdfDocumentReference) -> Cursor {
    let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    Cursor {
        layer: doc.get_page(page).get_layer(layer),
        y: TOP_Y,
    }
}

/// Break the page when fewer than `needed` millimetres remain, so section
/// headers are never orphaned at the bottom.
fn ensure_space(doc: &PdfDocumentReference, cursor: &mut Cursor, needed: f32) {
    if cursor.y - needed < BOTTOM_Y {
        *cursor = new_page(doc);
    }
}

fn text(cursor: &Cursor, fonts: &Fonts, s: &str, size: f32, x: f32, bold: bool) {
    let font = if bold { &fonts.bold } else { &fonts.regular };
    cursor.layer.use_text(s, size, Mm(x), Mm(cursor.y), font);
}

fn filled_box(cursor: &Cursor, x: f32, y_bottom: f32, w: f32, h: f32, color: Color) {
    cursor.layer.set_fill_color(color);
    let ring = vec![
        (Point::new(Mm(x), Mm(y_bottom)), false),
        (Point::new(Mm(x + w), Mm(y_bottom)), false),
        (Point::new(Mm(x + w), Mm(y_bottom + h)), false),
        (Point::new(Mm(x), Mm(y_bottom + h)), false),
    ];
    cursor.layer.add_polygon(Polygon {
        rings: vec![ring],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
}

fn wrapped_text(
    doc: &PdfDocumentReference,
    cursor: &mut Cursor,
    fonts: &Fonts,
    s: &str,
    size: f32,
    x: f32,
    max_chars: usize,
    line_height: f32,
) {
    for line in wrap_text(s, max_chars) {
        ensure_space(doc, cursor, line_height);
        text(cursor, fonts, &line, size, x, false);
        cursor.y -= line_height;
    }
}

fn embed_image(
    doc: &PdfDocumentReference,
    cursor: &mut Cursor,
    img: &image_crate::DynamicImage,
) {
    use printpdf::image_crate::GenericImageView;

    const DPI: f32 = 150.0;
    let (px_w, px_h) = img.dimensions();
    let w_mm = px_w as f32 * 25.4 / DPI;
    let h_mm = px_h as f32 * 25.4 / DPI;
    let scale = (160.0 / w_mm).min(90.0 / h_mm).min(1.0);
    let draw_h = h_mm * scale;

    ensure_space(doc, cursor, draw_h + 6.0);

    let pdf_image = Image::from_dynamic_image(img);
    pdf_image.add_to_layer(
        cursor.layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(MARGIN)),
            translate_y: Some(Mm(cursor.y - draw_h)),
            scale_x: Some(scale),
            scale_y: Some(scale),
            dpi: Some(DPI),
            ..Default::default()
        },
    );
    cursor.y -= draw_h + 6.0;
}

fn render_document(
    req: &ReportRequest<'_>,
    ultrasound: Option<Result<image_crate::DynamicImage, AssetError>>,
    chart_image: Option<image_crate::DynamicImage>,
) -> Result<Vec<u8>, ReportError> {
    let (doc, page1, layer1) = PdfDocument::new(
        "PCOSmart Screening Report",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Font(e.to_string()))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Font(e.to_string()))?,
    };
    let mut cursor = Cursor {
        layer: doc.get_page(page1).get_layer(layer1),
        y: TOP_Y,
    };

    // Header
    cursor.layer.set_fill_color(black());
    text(&cursor, &fonts, "PCOSmart Screening Report", 18.0, MARGIN, true);
    cursor.y -= 8.0;
    text(
        &cursor,
        &fonts,
        &format!("Mode: {}", req.mode.as_str().to_uppercase()),
        10.0,
        MARGIN,
        false,
    );
    cursor.y -= 5.0;
    text(
        &cursor,
        &fonts,
        &format!("Submission ID: {}", req.submission_id),
        10.0,
        MARGIN,
        false,
    );
    cursor.y -= 5.0;
    text(
        &cursor,
        &fonts,
        &format!(
            "Generated: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
        ),
        10.0,
        MARGIN,
        false,
    );
    cursor.y -= 10.0;

    // Result box: probability and color-coded risk level
    let box_h = 16.0;
    filled_box(
        &cursor,
        MARGIN,
        cursor.y - box_h,
        PAGE_WIDTH - 2.0 * MARGIN,
        box_h,
        risk_color(&req.result.risk_level),
    );
    cursor.layer.set_fill_color(rgb(1.0, 1.0, 1.0));
    cursor.layer.use_text(
        format!(
            "PCOS Probability: {}    Risk Level: {}",
            format_percent(req.result.probability),
            if req.result.risk_level.is_empty() {
                "Unknown"
            } else {
                req.result.risk_level.as_str()
            }
        ),
        12.0,
        Mm(MARGIN + 4.0),
        Mm(cursor.y - box_h + 5.5),
        &fonts.bold,
    );
    cursor.layer.set_fill_color(black());
    cursor.y -= box_h + 10.0;

    // Ultrasound image, for image-bearing submissions
    if let Some(fetched) = ultrasound {
        ensure_space(&doc, &mut cursor, 20.0);
        text(&cursor, &fonts, "Ultrasound Image", 13.0, MARGIN, true);
        cursor.y -= 7.0;
        match fetched {
            Ok(img) => embed_image(&doc, &mut cursor, &img),
            Err(_) => {
                cursor.layer.set_fill_color(rgb(0.78, 0.16, 0.16));
                text(
                    &cursor,
                    &fonts,
                    "Could not embed ultrasound image.",
                    9.0,
                    MARGIN,
                    false,
                );
                cursor.layer.set_fill_color(black());
                cursor.y -= 8.0;
            }
        }
    }

    // Factor breakdown: chart when the render succeeded, list otherwise
    ensure_space(&doc, &mut cursor, 30.0);
    text(&cursor, &fonts, "Top Contributing Factors", 13.0, MARGIN, true);
    cursor.y -= 7.0;
    if let Some(img) = chart_image {
        embed_image(&doc, &mut cursor, &img);
    } else if req.result.top_factors.is_empty() {
        text(&cursor, &fonts, "No factor breakdown returned.", 10.0, MARGIN, false);
        cursor.y -= 8.0;
    } else {
        for (idx, factor) in req.result.top_factors.iter().take(8).enumerate() {
            ensure_space(&doc, &mut cursor, 6.0);
            text(
                &cursor,
                &fonts,
                &format!(
                    "{}. {} | impact: {:.3} | {}",
                    idx + 1,
                    factor.feature,
                    factor.impact,
                    factor.direction
                ),
                10.0,
                MARGIN + 2.0,
                false,
            );
            cursor.y -= 5.0;
        }
        cursor.y -= 3.0;
    }

    // Narration and recommendations get their own page
    cursor = new_page(&doc);
    cursor.layer.set_fill_color(black());
    text(&cursor, &fonts, "Explanation", 13.0, MARGIN, true);
    cursor.y -= 7.0;
    let narration = if req.result.narration.is_empty() {
        "No explanation returned.".to_string()
    } else {
        req.result.narration.replace("**", "")
    };
    wrapped_text(&doc, &mut cursor, &fonts, &narration, 11.0, MARGIN, 88, 5.5);
    cursor.y -= 8.0;

    ensure_space(&doc, &mut cursor, 24.0);
    text(&cursor, &fonts, "Recommended Diet", 13.0, MARGIN, true);
    cursor.y -= 7.0;
    wrapped_text(
        &doc,
        &mut cursor,
        &fonts,
        &req.result.recommendations.diet,
        11.0,
        MARGIN,
        88,
        5.5,
    );
    cursor.y -= 8.0;

    ensure_space(&doc, &mut cursor, 24.0);
    text(&cursor, &fonts, "Recommended Exercise", 13.0, MARGIN, true);
    cursor.y -= 7.0;
    wrapped_text(
        &doc,
        &mut cursor,
        &fonts,
        &req.result.recommendations.exercise,
        11.0,
        MARGIN,
        88,
        5.5,
    );
    cursor.y -= 10.0;

    // Raw input snapshot (flat values only; nested objects are skipped)
    if let Some(snapshot) = req.input_snapshot.as_object() {
        if !snapshot.is_empty() {
            ensure_space(&doc, &mut cursor, 20.0);
            text(&cursor, &fonts, "Inputs (Snapshot)", 13.0, MARGIN, true);
            cursor.y -= 7.0;
            for (key, value) in snapshot {
                if matches!(value, Value::Object(_) | Value::Array(_)) {
                    continue;
                }
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ensure_space(&doc, &mut cursor, 6.0);
                text(&cursor, &fonts, key, 9.0, MARGIN + 2.0, false);
                text(
                    &cursor,
                    &fonts,
                    &truncate_value(&rendered, SNAPSHOT_VALUE_MAX_CHARS),
                    9.0,
                    MARGIN + 75.0,
                    false,
                );
                cursor.y -= 5.0;
            }
            cursor.y -= 5.0;
        }
    }

    // Disclaimer
    ensure_space(&doc, &mut cursor, 18.0);
    text(&cursor, &fonts, "Disclaimer", 10.0, MARGIN, true);
    cursor.y -= 5.0;
    wrapped_text(&doc, &mut cursor, &fonts, DISCLAIMER, 9.0, MARGIN, 96, 4.5);

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Save(e.to_string()))?;
    buf.into_inner()
        .map_err(|e| ReportError::Save(e.to_string()))
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
