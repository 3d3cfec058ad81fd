//! Proxy client for the conversational health assistant.
//!
//! Wraps a generative-AI REST endpoint with the fixed "Cora" system
//! instruction. The backend never stores chat content; each request carries
//! its own history.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are Cora, a PCOS Assistant.\n\
RULES:\n\
1. Keep answers VERY SHORT (maximum 3 sentences).\n\
2. Use bullet points for lists.\n\
3. Do not fluff your language. Get straight to the point.\n\
4. Always end with: \"Consult a doctor for specific advice.\"";

const MAX_OUTPUT_TOKENS: u32 = 150;
const TEMPERATURE: f64 = 0.7;

#[derive(Debug, Error)]
pub enum ChatbotError {
    #[error("Cannot reach chatbot service at {0}")]
    Connection(String),
    #[error("Chatbot request timed out after {0}s")]
    Timeout(u64),
    #[error("Chatbot service error (status {status})")]
    Upstream { status: u16, body: String },
    #[error("Cannot parse chatbot response: {0}")]
    ResponseParsing(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

/// One prior turn of the conversation, in the generative API's own shape
/// so the client can pass it through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub parts: Vec<ChatPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPart {
    pub text: String,
}

#[derive(Debug)]
pub struct ChatbotClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ChatbotClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        }
    }

    /// Send one user message with optional prior turns; returns the
    /// assistant's reply text.
    pub async fn reply(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, ChatbotError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| serde_json::to_value(turn).unwrap_or_default())
            .collect();
        contents.push(serde_json::json!({
            "role": "user",
            "parts": [{ "text": message }],
        }));

        let body = serde_json::json!({
            "system_instruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
                "temperature": TEMPERATURE,
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ChatbotError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    ChatbotError::Timeout(self.timeout_secs)
                } else {
                    ChatbotError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatbotError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatbotError::ResponseParsing(e.to_string()))?;

        extract_reply(&parsed)
            .ok_or_else(|| ChatbotError::ResponseParsing("no candidate text".to_string()))
    }
}

/// Concatenated text parts of the first candidate.
fn extract_reply(response: &serde_json::Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
