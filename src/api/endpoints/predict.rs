//! Prediction submission endpoints, one per mode.
//!
//! JSON bodies arrive untyped so the normalizer can apply its coercion
//! rules; multipart bodies are unpacked here and handed to the
//! orchestrator.

use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, OwnerContext};
use crate::models::{PredictionResponse, UploadedImage};
use crate::pipeline::orchestrator;

/// `POST /api/predict/simple`
pub async fn simple(
    State(ctx): State<ApiContext>,
    Extension(owner): Extension<OwnerContext>,
    Json(body): Json<Value>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let response = orchestrator::submit_simple(&ctx, &owner.owner_id, &body).await?;
    Ok(Json(response))
}

/// `POST /api/predict/clinical`
pub async fn clinical(
    State(ctx): State<ApiContext>,
    Extension(owner): Extension<OwnerContext>,
    Json(body): Json<Value>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let response = orchestrator::submit_clinical(&ctx, &owner.owner_id, &body).await?;
    Ok(Json(response))
}

/// `POST /api/predict/image`: multipart with a binary `image` field.
pub async fn image(
    State(ctx): State<ApiContext>,
    Extension(owner): Extension<OwnerContext>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    let (image, _) = read_multipart(multipart).await?;
    let response = orchestrator::submit_image(&ctx, &owner.owner_id, image).await?;
    Ok(Json(response))
}

/// `POST /api/predict/combined`: multipart with `image` plus a
/// JSON-string `clinical` field.
pub async fn combined(
    State(ctx): State<ApiContext>,
    Extension(owner): Extension<OwnerContext>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    let (image, clinical) = read_multipart(multipart).await?;
    let response = orchestrator::submit_combined(&ctx, &owner.owner_id, image, clinical).await?;
    Ok(Json(response))
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(Option<UploadedImage>, Option<String>), ApiError> {
    let mut image = None;
    let mut clinical = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid image field: {e}")))?
                    .to_vec();
                image = Some(UploadedImage {
                    data,
                    filename,
                    content_type,
                });
            }
            Some("clinical") => {
                clinical = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Invalid clinical field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    Ok((image, clinical))
}
