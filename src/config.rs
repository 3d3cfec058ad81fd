use std::path::PathBuf;

use crate::models::InputMode;

/// Application-level constants
pub const APP_NAME: &str = "PCOSmart";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// External predictor calls are given 30 seconds and never retried.
pub const DEFAULT_PREDICTOR_TIMEOUT_SECS: u64 = 30;
/// Report asset fetches (ultrasound, chart) are best-effort and short.
pub const DEFAULT_ASSET_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_CHART_BASE_URL: &str = "https://quickchart.io/chart";
pub const DEFAULT_CHATBOT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CHATBOT_MODEL: &str = "gemini-2.5-flash";

pub fn default_log_filter() -> String {
    "pcosmart=info,tower_http=warn".to_string()
}

/// All runtime configuration, resolved once at startup and passed into the
/// API context. Endpoints that depend on an unset URL fail with a
/// configuration error at call time, before any database write.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub predictor_base_url: Option<String>,
    pub predictor_timeout_secs: u64,
    pub asset_timeout_secs: u64,
    pub object_storage_url: Option<String>,
    pub ultrasound_folder: String,
    pub combined_folder: String,
    pub chart_base_url: String,
    pub chatbot_base_url: String,
    pub chatbot_api_key: Option<String>,
    pub chatbot_model: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let port = env_var("PORT").unwrap_or_else(|| "5000".to_string());
        Self {
            bind_addr: format!("0.0.0.0:{port}"),
            database_path: env_var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("pcosmart.db")),
            predictor_base_url: env_var("ML_SERVICE_URL"),
            predictor_timeout_secs: env_u64("ML_TIMEOUT_SECS", DEFAULT_PREDICTOR_TIMEOUT_SECS),
            asset_timeout_secs: env_u64("ASSET_TIMEOUT_SECS", DEFAULT_ASSET_TIMEOUT_SECS),
            object_storage_url: env_var("OBJECT_STORAGE_URL"),
            ultrasound_folder: env_var("ULTRASOUND_FOLDER")
                .unwrap_or_else(|| "pcosmart/ultrasound".to_string()),
            combined_folder: env_var("COMBINED_FOLDER")
                .unwrap_or_else(|| "pcosmart/combined".to_string()),
            chart_base_url: env_var("CHART_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_CHART_BASE_URL.to_string()),
            chatbot_base_url: env_var("CHATBOT_API_URL")
                .unwrap_or_else(|| DEFAULT_CHATBOT_BASE_URL.to_string()),
            chatbot_api_key: env_var("CHATBOT_API_KEY"),
            chatbot_model: env_var("CHATBOT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHATBOT_MODEL.to_string()),
        }
    }

    /// Object-storage folder namespace for an image-bearing mode.
    pub fn storage_folder(&self, mode: InputMode) -> &str {
        match mode {
            InputMode::Combined => &self.combined_folder,
            _ => &self.ultrasound_folder,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            database_path: PathBuf::from("pcosmart.db"),
            predictor_base_url: None,
            predictor_timeout_secs: DEFAULT_PREDICTOR_TIMEOUT_SECS,
            asset_timeout_secs: DEFAULT_ASSET_TIMEOUT_SECS,
            object_storage_url: None,
            ultrasound_folder: "pcosmart/ultrasound".to_string(),
            combined_folder: "pcosmart/combined".to_string(),
            chart_base_url: DEFAULT_CHART_BASE_URL.to_string(),
            chatbot_base_url: DEFAULT_CHATBOT_BASE_URL.to_string(),
            chatbot_api_key: None,
            chatbot_model: DEFAULT_CHATBOT_MODEL.to_string(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
