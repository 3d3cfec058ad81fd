//! API router.
//!
//! All `/api` routes sit behind the verified-identity middleware; the root
//! liveness probe is public. CORS admits the known front-end origins.

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the full application router.
pub fn build_router(ctx: ApiContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("https://pcosmart.vercel.app"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
        ])
        .allow_credentials(true);

    let api = Router::new()
        .route("/predict/simple", post(endpoints::predict::simple))
        .route("/predict/clinical", post(endpoints::predict::clinical))
        .route("/predict/image", post(endpoints::predict::image))
        .route("/predict/combined", post(endpoints::predict::combined))
        .route("/history/:mode", get(endpoints::history::list))
        .route("/chat", post(endpoints::chat::send))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::auth::require_owner));

    Router::new()
        .route("/", get(endpoints::health::root))
        .nest("/api", api)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::extract::State;
    use axum::http::{Request, StatusCode};
    use axum::Json;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServiceConfig;
    use crate::db::repository::submission as submissions;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{InputMode, Submission};
    use crate::pipeline::recommend::MODERATE_DIET;

    fn test_ctx(config: ServiceConfig) -> ApiContext {
        ApiContext::new(Arc::new(config), open_memory_database().unwrap())
    }

    fn simple_body() -> Value {
        json!({
            "age": 28, "bmi": 24.5, "pulseRate": 72, "respiratoryRate": 16,
            "hemoglobin": 12.5, "menstrualCycleType": "2", "averageCycleLength": 28,
            "weightGain": "yes", "hairGrowth": false, "skinDarkening": 0,
            "hairLoss": "n", "pimples": 1, "fastFood": true, "regularExercise": "no",
            "bpSystolic": 118, "bpDiastolic": 76
        })
    }

    fn json_request(method: &str, uri: &str, owner: Option<&str>, body: Option<&Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            builder = builder.header("X-User-Id", owner);
        }
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn response_json(response: axum::http::Response<Body>) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn submission_count(ctx: &ApiContext) -> i64 {
        let conn = ctx.db.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))
            .unwrap()
    }

    /// Spawn a local predictor stub answering `/predict/simple`, capturing
    /// the request body for wire-contract assertions.
    async fn spawn_predictor_stub(
        status: StatusCode,
        response: Value,
    ) -> (String, Arc<Mutex<Option<Value>>>) {
        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let state = (captured.clone(), status, response);

        let stub = Router::new()
            .route(
                "/predict/simple",
                post(
                    |State((captured, status, response)): State<(
                        Arc<Mutex<Option<Value>>>,
                        StatusCode,
                        Value,
                    )>,
                     Json(body): Json<Value>| async move {
                        *captured.lock().unwrap() = Some(body);
                        (status, Json(response))
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, stub).await.unwrap();
        });

        (format!("http://127.0.0.1:{}", addr.port()), captured)
    }

    fn multipart_body(parts: &[(&str, Option<&str>, Vec<u8>)]) -> (String, Vec<u8>) {
        let boundary = "XPCOSBOUNDARY";
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    fn combined_clinical_json() -> Value {
        let mut obj = serde_json::Map::new();
        for key in crate::pipeline::validate::REQUIRED_COMBINED_KEYS {
            obj.insert(key.to_string(), json!(5.0));
        }
        Value::Object(obj)
    }

    #[tokio::test]
    async fn root_is_public() {
        let app = build_router(test_ctx(ServiceConfig::default()));
        let response = app.oneshot(json_request("GET", "/", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn api_requires_verified_identity() {
        let app = build_router(test_ctx(ServiceConfig::default()));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/predict/simple",
                None,
                Some(&simple_body()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_field_is_named_and_nothing_is_persisted() {
        let ctx = test_ctx(ServiceConfig::default());
        let app = build_router(ctx.clone());

        let mut body = simple_body();
        body.as_object_mut().unwrap().remove("bmi");
        let response = app
            .oneshot(json_request("POST", "/api/predict/simple", Some("user-1"), Some(&body)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"]["message"], "Missing required field: bmi");
        assert_eq!(submission_count(&ctx), 0);
    }

    #[tokio::test]
    async fn invalid_cycle_type_is_rejected() {
        let ctx = test_ctx(ServiceConfig::default());
        let app = build_router(ctx.clone());

        let mut body = simple_body();
        body["menstrualCycleType"] = json!(3);
        let response = app
            .oneshot(json_request("POST", "/api/predict/simple", Some("user-1"), Some(&body)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("menstrualCycleType"));
        assert_eq!(submission_count(&ctx), 0);
    }

    #[tokio::test]
    async fn unconfigured_predictor_fails_before_any_write() {
        let ctx = test_ctx(ServiceConfig::default());
        let app = build_router(ctx.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/predict/simple",
                Some("user-1"),
                Some(&simple_body()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_CONFIGURED");
        assert_eq!(submission_count(&ctx), 0);
    }

    #[tokio::test]
    async fn simple_mode_end_to_end() {
        let (base_url, captured) = spawn_predictor_stub(
            StatusCode::OK,
            json!({
                "probability": 0.42,
                "risk_level": "Moderate",
                "top_factors": [],
                "narration": "Borderline indicators across cycle and BMI."
            }),
        )
        .await;

        let ctx = test_ctx(ServiceConfig {
            predictor_base_url: Some(base_url),
            ..ServiceConfig::default()
        });
        let app = build_router(ctx.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/predict/simple",
                Some("user-1"),
                Some(&simple_body()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;

        assert_eq!(json["message"], "Prediction completed");
        assert_eq!(json["inputMode"], "simple");
        assert_eq!(json["mlResult"]["risk_level"], "Moderate");
        assert_eq!(json["mlResult"]["recommendations"]["diet"], MODERATE_DIET);

        // Normalized flags reached the predictor under the contract keys.
        let sent = captured.lock().unwrap().clone().unwrap();
        assert_eq!(sent["weight_gain_y_n"], 1);
        assert_eq!(sent["hair_growth_y_n"], 0);
        assert_eq!(sent["hair_loss_y_n"], 0);
        assert_eq!(sent["fast_food_y_n"], 1);
        assert_eq!(sent["reg_exercise_y_n"], 0);
        assert_eq!(sent["cycle_r_i"], "2");

        // Simple mode needs no remote assets, so the report embeds cleanly.
        let report = &json["report"];
        assert_eq!(report["mimeType"], "application/pdf");
        let filename = report["filename"].as_str().unwrap();
        assert!(filename.starts_with("PCOSmart_simple_"));
        let pdf = BASE64.decode(report["base64"].as_str().unwrap()).unwrap();
        assert!(pdf.starts_with(b"%PDF"));

        // Raw input and prediction output both persisted.
        let submission_id = json["submissionId"].as_str().unwrap();
        let conn = ctx.db.lock().unwrap();
        let stored = submissions::get_submission(&conn, submission_id).unwrap();
        assert_eq!(stored.raw_input["weightGain"], true);
        assert_eq!(stored.raw_input["menstrualCycleType"], 2);
        assert_eq!(stored.prediction_output.unwrap().probability, 0.42);
    }

    #[tokio::test]
    async fn predictor_failure_preserves_raw_submission() {
        let (base_url, _) =
            spawn_predictor_stub(StatusCode::INTERNAL_SERVER_ERROR, json!({"detail": "boom"}))
                .await;

        let ctx = test_ctx(ServiceConfig {
            predictor_base_url: Some(base_url),
            ..ServiceConfig::default()
        });
        let app = build_router(ctx.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/predict/simple",
                Some("user-1"),
                Some(&simple_body()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "UPSTREAM");
        assert_eq!(json["error"]["detail"]["detail"], "boom");

        // The raw record stays, unenriched; not rolled back.
        let conn = ctx.db.lock().unwrap();
        let history = submissions::list_by_owner(&conn, "user-1", InputMode::Simple).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].prediction_output.is_none());
    }

    #[tokio::test]
    async fn image_mode_requires_attachment() {
        let ctx = test_ctx(ServiceConfig::default());
        let app = build_router(ctx.clone());

        let (content_type, body) = multipart_body(&[("note", None, b"no image here".to_vec())]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/predict/image")
            .header("X-User-Id", "user-1")
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(
            json["error"]["message"],
            "Image file is required (field name: image)"
        );
    }

    #[tokio::test]
    async fn combined_mode_names_missing_clinical_key_before_upload() {
        // Storage is configured but unreachable; the validation failure must
        // win, proving no upload was attempted.
        let ctx = test_ctx(ServiceConfig {
            predictor_base_url: Some("http://127.0.0.1:1".to_string()),
            object_storage_url: Some("http://127.0.0.1:1".to_string()),
            ..ServiceConfig::default()
        });
        let app = build_router(ctx.clone());

        let mut clinical = combined_clinical_json();
        clinical.as_object_mut().unwrap().remove("endometrium_mm");
        let (content_type, body) = multipart_body(&[
            ("image", Some("scan.jpg"), vec![0xFF, 0xD8, 0xFF, 0xD9]),
            ("clinical", None, clinical.to_string().into_bytes()),
        ]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/predict/combined")
            .header("X-User-Id", "user-1")
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(
            json["error"]["message"],
            "Missing required clinical field: endometrium_mm"
        );
        assert_eq!(submission_count(&ctx), 0);
    }

    #[tokio::test]
    async fn combined_mode_rejects_unparsable_clinical_json() {
        let ctx = test_ctx(ServiceConfig::default());
        let app = build_router(ctx.clone());

        let (content_type, body) = multipart_body(&[
            ("image", Some("scan.jpg"), vec![0xFF, 0xD8, 0xFF, 0xD9]),
            ("clinical", None, b"{not json".to_vec()),
        ]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/predict/combined")
            .header("X-User-Id", "user-1")
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"]["message"], "Invalid clinical JSON");
    }

    #[tokio::test]
    async fn history_is_owner_scoped_and_newest_first() {
        let ctx = test_ctx(ServiceConfig::default());

        {
            let conn = ctx.db.lock().unwrap();
            let raw = simple_body();
            let mut normalized = raw.clone();
            normalized["menstrualCycleType"] = json!(2);
            let mut older = Submission::new("user-1", InputMode::Simple, normalized.clone());
            older.created_at = "2026-08-01T10:00:00Z".parse().unwrap();
            let mut newer = Submission::new("user-1", InputMode::Simple, normalized.clone());
            newer.created_at = "2026-08-05T10:00:00Z".parse().unwrap();
            let other = Submission::new("user-2", InputMode::Simple, normalized);
            for s in [&older, &newer, &other] {
                submissions::insert_submission(&conn, s).unwrap();
            }
        }

        let app = build_router(ctx.clone());
        let response = app
            .oneshot(json_request("GET", "/api/history/simple", Some("user-1"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        let history = json["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["ownerId"], "user-1");
        assert!(
            history[0]["createdAt"].as_str().unwrap() > history[1]["createdAt"].as_str().unwrap()
        );
    }

    #[tokio::test]
    async fn history_rejects_unknown_mode() {
        let app = build_router(test_ctx(ServiceConfig::default()));
        let response = app
            .oneshot(json_request("GET", "/api/history/fusion", Some("user-1"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_requires_message_and_configuration() {
        let ctx = test_ctx(ServiceConfig::default());

        let app = build_router(ctx.clone());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat",
                Some("user-1"),
                Some(&json!({"message": "  "})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let app = build_router(ctx);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat",
                Some("user-1"),
                Some(&json!({"message": "What is PCOS?"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_CONFIGURED");
    }
}
