//! Verified-identity precondition for all `/api` routes.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in `X-User-Id`. Requests without it are rejected before any handler
//! runs, and handlers read the identity from the `OwnerContext` extension.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::OwnerContext;

pub const OWNER_HEADER: &str = "X-User-Id";

pub async fn require_owner(mut req: Request, next: Next) -> Response {
    let owner_id = req
        .headers()
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    match owner_id {
        Some(owner_id) => {
            req.extensions_mut().insert(OwnerContext { owner_id });
            next.run(req).await
        }
        None => ApiError::Unauthorized.into_response(),
    }
}
