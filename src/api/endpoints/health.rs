//! Liveness probe.

use axum::Json;
use serde_json::{json, Value};

use crate::config;

/// `GET /`: confirms the server is up.
pub async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": config::APP_VERSION,
    }))
}
