//! Test application factory for integration tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

use certkit::models::{AppConfig, QualityTier, UploadConfig};
use certkit::server::{build_router, create_app_state, AppState};
use certkit::services::CertificateExporter;

/// Configuration for tests: no system fonts, no batch pause, low-dpi PDFs
pub fn test_config(downloads_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.validation_origin = "https://cursos.example.com".to_string();
    config.fonts.system_fonts = false;
    config.export.batch_pause_ms = 0;
    config.export.default_tier = QualityTier::Low;
    config.export.downloads_dir = downloads_dir.to_path_buf();
    config.reflow.retry_delay_ms = 0;
    config
}

/// Test application with router and direct access to services
pub struct TestApp {
    router: axum::Router,
    pub state: AppState,
    /// Keeps the downloads directory alive for the test's duration
    pub downloads: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_upload(None)
    }

    /// Create a test app whose thumbnails go to `upload`
    pub fn with_upload(upload: Option<UploadConfig>) -> Self {
        Self::with_config(|config| config.upload = upload)
    }

    /// Create a test app after adjusting the test configuration
    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let downloads = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = test_config(downloads.path());
        adjust(&mut config);

        // Create application state using shared server module
        let state = create_app_state(config).expect("Failed to create app state");

        // Build router using shared server module (same as production)
        let router = build_router(state.clone());

        Self {
            router,
            state,
            downloads,
        }
    }

    pub fn exporter(&self) -> Arc<CertificateExporter> {
        self.state.exporter.clone()
    }

    /// Make a GET request to the given path
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// Make a POST request with a JSON body
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> TestResponse {
        let request = Request::post(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// Send a request to the router
    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Test response with convenience methods
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON response")
    }

    /// Get body as string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
