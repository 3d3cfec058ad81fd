//! Health-assistant chat proxy.
//!
//! Stateless: the client carries its own conversation history on every
//! request, and nothing is persisted here.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, OwnerContext};
use crate::chatbot::{ChatTurn, ChatbotError};

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub text: String,
}

/// `POST /api/chat`
pub async fn send(
    State(ctx): State<ApiContext>,
    Extension(_owner): Extension<OwnerContext>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is required".into()));
    }

    let client = ctx.chatbot()?;
    let text = client
        .reply(&request.message, &request.history)
        .await
        .map_err(chat_failure)?;

    Ok(Json(ChatResponse { text }))
}

fn chat_failure(err: ChatbotError) -> ApiError {
    let detail = match &err {
        ChatbotError::Upstream { body, .. } => {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone()))
        }
        other => Value::String(other.to_string()),
    };
    ApiError::Upstream {
        message: "Service busy, please try again.".to_string(),
        detail: Some(detail),
    }
}
