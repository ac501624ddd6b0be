//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use mediscan_core::Result;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::analysis::{
    generate_report, get_analysis, list_analyses, review_analysis, save_analysis, upload_image,
    view_report,
};
use crate::appointments::{
    create_appointment, delete_appointment, get_appointment, list_appointments, update_appointment,
};
use crate::handlers::{
    api_root, dashboard_charts, dashboard_recent, dashboard_stats, get_settings, health,
    trigger_training, update_settings, verify_admin,
};
use crate::patients::{create_patient, delete_patient, get_patient, list_patients, update_patient};
use crate::state::AppState;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// 构建完整路由
pub fn create_app(state: AppState) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        // 根路径
        .route("/", get(api_root))
        // 健康检查
        .route("/health", get(health))
        // API路由
        .nest("/api", api_routes())
        // 上传图像与报告文件
        .nest_service("/uploads", ServeDir::new(state.upload_dir()))
        .nest_service("/reports", ServeDir::new(state.report_dir()))
        .layer(DefaultBodyLimit::max(body_limit))
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/patients", post(create_patient).get(list_patients))
        .route(
            "/patients/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/analysis", get(list_analyses))
        .route("/analysis/upload", post(upload_image))
        .route("/analysis/save", post(save_analysis))
        .route("/analysis/:id", get(get_analysis).put(review_analysis))
        .route("/analysis/:id/generate-report", post(generate_report))
        .route("/analysis/:id/report", get(view_report))
        .route("/appointments", post(create_appointment).get(list_appointments))
        .route(
            "/appointments/:id",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/dashboard/charts", get(dashboard_charts))
        .route("/dashboard/recent", get(dashboard_recent))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/settings/verify-admin", post(verify_admin))
        .route("/settings/train", post(trigger_training))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use mediscan_core::{ConfidenceScores, Diagnosis};
    use mediscan_database::MemoryStore;
    use mediscan_integration::{Classifier, Prediction, PredictionSource, TrainingClient};
    use mediscan_storage::{ImageStore, ReportStore};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct NormalClassifier;

    #[async_trait]
    impl Classifier for NormalClassifier {
        async fn classify(&self, _image: &Path) -> mediscan_core::Result<Prediction> {
            Ok(Prediction {
                diagnosis: Diagnosis::Normal,
                confidence_scores: ConfidenceScores::from_ordered([0.02, 0.95, 0.02, 0.01]),
                primary_confidence: 0.95,
                source: PredictionSource::Fallback,
            })
        }
    }

    fn test_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            ImageStore::new(dir.path().join("uploads"), 1024 * 1024),
            ReportStore::new(dir.path().join("reports")),
            Arc::new(NormalClassifier),
            TrainingClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap(),
            false,
        );
        (create_app(state), dir)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn multipart_request(file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let boundary = "mediscan-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/analysis/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn register(app: &Router) -> Value {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/api/patients",
                json!({"fullName": "Anita Das", "age": 41, "gender": "Female", "phoneNumber": "9000011111"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"].clone()
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let (app, _dir) = test_app();
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "MediScan API");
    }

    #[tokio::test]
    async fn test_patient_crud_envelope() {
        let (app, _dir) = test_app();
        let patient = register(&app).await;
        let code = patient["patientId"].as_str().unwrap().to_string();
        assert!(code.starts_with("PID-"));
        assert_eq!(patient["totalScans"], 0);

        let (status, body) = send(&app, get("/api/patients?limit=5&sortBy=fullName&order=asc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["totalPages"], 1);
        assert_eq!(body["currentPage"], 1);

        let (status, body) = send(
            &app,
            json_request("PUT", &format!("/api/patients/{}", code), json!({"age": 42})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["age"], 42);

        let (status, body) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/patients/{}", code))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deletedAnalyses"], 0);

        let (status, body) = send(&app, get(&format!("/api/patients/{}", code))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "message": "Patient not found"}));
    }

    #[tokio::test]
    async fn test_bad_requests_use_envelope() {
        let (app, _dir) = test_app();
        let (status, body) = send(
            &app,
            json_request("POST", "/api/patients", json!({"fullName": "X", "gender": "Unknown"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body.get("details").is_none());

        let (status, body) = send(&app, get("/api/patients?sortBy=password")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot sort by 'password'");
    }

    #[tokio::test]
    async fn test_upload_save_and_report_flow() {
        let (app, _dir) = test_app();
        let patient = register(&app).await;

        let (status, body) = send(&app, multipart_request("lung.png", "image/png", b"\x89PNG..")).await;
        assert_eq!(status, StatusCode::OK);
        let upload = body["data"].clone();
        let image_url = upload["imageUrl"].as_str().unwrap().to_string();
        assert!(image_url.starts_with("/uploads/"));
        assert_eq!(upload["diagnosis"], "Normal");
        assert_eq!(upload["source"], "fallback");

        let response = app.clone().oneshot(get(&image_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/analysis/save",
                json!({
                    "patientId": patient["_id"],
                    "imagePath": upload["imagePath"],
                    "imageUrl": image_url,
                    "diagnosis": upload["diagnosis"],
                    "primaryConfidence": upload["primaryConfidence"],
                    "confidenceScores": upload["confidenceScores"]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let analysis_id = body["data"]["analysisId"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["patient"]["fullName"], "Anita Das");

        let (_, body) = send(
            &app,
            get(&format!("/api/analysis?patientId={}", patient["patientId"].as_str().unwrap())),
        )
        .await;
        assert_eq!(body["count"], 1);

        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri(format!("/api/analysis/{}/generate-report", analysis_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Report generated successfully");
        assert_eq!(body["data"]["reportGenerated"], true);
        let report_path = body["data"]["reportPath"].as_str().unwrap().to_string();

        let response = app.clone().oneshot(get(&report_path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get(&format!("/api/analysis/{}/report", analysis_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"));

        let response = app
            .clone()
            .oneshot(get(&format!("/api/analysis/{}/report?format=pdf", analysis_id)))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");

        let (_, body) = send(&app, get("/api/dashboard/stats")).await;
        assert_eq!(body["data"]["totalScans"], 1);
        assert_eq!(body["data"]["positiveCases"], 0);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let (app, dir) = test_app();
        let (status, body) = send(&app, multipart_request("scan.gif", "image/gif", b"GIF89a")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Only .png, .jpg and .jpeg format allowed!");
        let uploads = dir.path().join("uploads");
        assert_eq!(std::fs::read_dir(uploads).map(|d| d.count()).unwrap_or(0), 0);

        let (status, body) = send(
            &app,
            multipart_request("big.png", "image/png", &vec![0u8; 1024 * 1024 + 1]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_appointment_routes() {
        let (app, _dir) = test_app();
        let patient = register(&app).await;

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/appointments",
                json!({
                    "patientId": patient["patientId"],
                    "appointmentDate": "2099-01-15",
                    "appointmentTime": "11:00",
                    "appointmentType": "Follow-up"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["appointmentId"].as_str().unwrap().to_string();

        let (_, body) = send(&app, get("/api/appointments?upcoming=true")).await;
        assert_eq!(body["count"], 1);

        let (status, body) = send(
            &app,
            json_request("PUT", &format!("/api/appointments/{}", id), json!({"status": "Cancelled"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cancel reason is required when cancelling an appointment");

        let (_, body) = send(&app, get("/api/dashboard/stats")).await;
        assert_eq!(body["data"]["upcomingAppointments"], 1);
    }

    #[tokio::test]
    async fn test_settings_routes() {
        let (app, _dir) = test_app();
        let (status, body) = send(&app, get("/api/settings")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["adminPassword"], "");

        let (status, _) = send(
            &app,
            json_request("PUT", "/api/settings", json!({"confidenceThreshold": 2.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(
            &app,
            json_request("POST", "/api/settings/verify-admin", json!({"password": "admin123"})),
        )
        .await;
        assert_eq!(body["data"]["verified"], true);

        let (status, body) = send(
            &app,
            json_request("POST", "/api/settings/train", json!({"password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            json_request("POST", "/api/settings/train", json!({"password": "admin123"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, body) = send(&app, get("/api/dashboard/charts")).await;
        assert_eq!(body["data"]["scansByMonth"].as_array().unwrap().len(), 6);
    }
}
