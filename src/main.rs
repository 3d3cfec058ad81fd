use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use pcosmart::api::router::build_router;
use pcosmart::api::types::ApiContext;
use pcosmart::config::{self, ServiceConfig};
use pcosmart::db::sqlite::open_database;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let config = ServiceConfig::from_env();
    tracing::info!("{} backend starting v{}", config::APP_NAME, config::APP_VERSION);
    if config.predictor_base_url.is_none() {
        tracing::warn!("ML_SERVICE_URL not set; prediction endpoints will refuse requests");
    }

    let conn = open_database(&config.database_path).expect("Cannot open database");
    let bind_addr = config.bind_addr.clone();
    let ctx = ApiContext::new(Arc::new(config), conn);
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Cannot bind server address");
    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, app).await.expect("server error");
}
