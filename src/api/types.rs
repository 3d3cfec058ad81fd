//! Shared types for the API layer.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::chatbot::ChatbotClient;
use crate::config::ServiceConfig;
use crate::object_storage::ObjectStorageClient;
use crate::pipeline::predictor::PredictorClient;
use crate::report::ReportGenerator;

use super::error::ApiError;

/// Shared context for all API routes: configuration, the submission store,
/// and one client per external collaborator. Clients whose endpoint is not
/// configured are absent; using one is a configuration error at call time.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<ServiceConfig>,
    pub db: Arc<Mutex<Connection>>,
    pub predictor: Option<Arc<PredictorClient>>,
    pub storage: Option<Arc<ObjectStorageClient>>,
    pub report: Arc<ReportGenerator>,
    pub chatbot: Option<Arc<ChatbotClient>>,
}

impl ApiContext {
    pub fn new(config: Arc<ServiceConfig>, conn: Connection) -> Self {
        let predictor = config
            .predictor_base_url
            .as_deref()
            .map(|url| Arc::new(PredictorClient::new(url, config.predictor_timeout_secs)));
        let storage = config
            .object_storage_url
            .as_deref()
            .map(|url| Arc::new(ObjectStorageClient::new(url, config.asset_timeout_secs)));
        let chatbot = config.chatbot_api_key.as_deref().map(|key| {
            Arc::new(ChatbotClient::new(
                &config.chatbot_base_url,
                key,
                &config.chatbot_model,
                config.predictor_timeout_secs,
            ))
        });
        let report = Arc::new(ReportGenerator::new(
            &config.chart_base_url,
            config.asset_timeout_secs,
        ));

        Self {
            config,
            db: Arc::new(Mutex::new(conn)),
            predictor,
            storage,
            report,
            chatbot,
        }
    }

    pub fn predictor(&self) -> Result<&PredictorClient, ApiError> {
        self.predictor
            .as_deref()
            .ok_or_else(|| ApiError::NotConfigured("ML_SERVICE_URL not set in environment".into()))
    }

    pub fn storage(&self) -> Result<&ObjectStorageClient, ApiError> {
        self.storage.as_deref().ok_or_else(|| {
            ApiError::NotConfigured("OBJECT_STORAGE_URL not set in environment".into())
        })
    }

    pub fn chatbot(&self) -> Result<&ChatbotClient, ApiError> {
        self.chatbot
            .as_deref()
            .ok_or_else(|| ApiError::NotConfigured("CHATBOT_API_KEY not set in environment".into()))
    }
}

/// Verified caller identity, injected into request extensions by the
/// identity middleware. How the id was authenticated is the gateway's
/// concern, not this service's.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub owner_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn unconfigured_clients_surface_config_errors() {
        let ctx = ApiContext::new(
            Arc::new(ServiceConfig::default()),
            open_memory_database().unwrap(),
        );
        assert!(matches!(
            ctx.predictor().unwrap_err(),
            ApiError::NotConfigured(_)
        ));
        assert!(matches!(
            ctx.storage().unwrap_err(),
            ApiError::NotConfigured(_)
        ));
        assert!(matches!(
            ctx.chatbot().unwrap_err(),
            ApiError::NotConfigured(_)
        ));
    }

    #[test]
    fn configured_urls_build_clients() {
        let config = ServiceConfig {
            predictor_base_url: Some("http://127.0.0.1:8001".to_string()),
            object_storage_url: Some("http://127.0.0.1:8002".to_string()),
            chatbot_api_key: Some("key".to_string()),
            ..ServiceConfig::default()
        };
        let ctx = ApiContext::new(Arc::new(config), open_memory_database().unwrap());
        assert!(ctx.predictor().is_ok());
        assert!(ctx.storage().is_ok());
        assert!(ctx.chatbot().is_ok());
    }
}
