//! Submission history for the calling owner.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, OwnerContext};
use crate::db::repository::submission as submissions;
use crate::models::{InputMode, Submission};

#[derive(Serialize)]
pub struct HistoryResponse {
    pub history: Vec<Submission>,
}

/// `GET /api/history/:mode`: submissions of one mode, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(owner): Extension<OwnerContext>,
    Path(mode): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let mode = InputMode::from_str(&mode)
        .map_err(|_| ApiError::BadRequest(format!("Unknown history mode: {mode}")))?;

    let conn = ctx
        .db
        .lock()
        .map_err(|_| ApiError::Internal("database lock poisoned".into()))?;
    let history = submissions::list_by_owner(&conn, &owner.owner_id, mode)?;

    Ok(Json(HistoryResponse { history }))
}
