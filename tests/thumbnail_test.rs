//! Thumbnail generation and upload against a mock backend.

mod common;

use axum::http::StatusCode;
use common::fixtures::*;
use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certkit::models::{UploadConfig, VariableMap};

fn upload_config(server: &MockServer) -> UploadConfig {
    UploadConfig {
        endpoint: format!("{}/certificados/{{id}}/thumbnail", server.uri()),
        field: "thumbnail".to_string(),
    }
}

#[tokio::test]
async fn test_uploads_once_per_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/certificados/rec-1/thumbnail"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_upload(Some(upload_config(&server)));
    let template = template(solid_scene("#ff0000"));

    let first = app
        .state
        .thumbnails
        .generate_and_upload("rec-1", &template, &VariableMap::new())
        .await;
    assert!(first.success, "{:?}", first.error);
    assert!(!first.skipped);

    let second = app
        .state
        .thumbnails
        .generate_and_upload("rec-1", &template, &VariableMap::new())
        .await;
    assert!(second.success);
    assert!(second.skipped);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"thumbnail\""));
    assert!(body.contains("filename=\"thumbnail_rec-1.png\""));
    assert!(body.contains("Content-Type: image/png") || body.contains("content-type: image/png"));
}

#[tokio::test]
async fn test_rejected_upload_can_be_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("storage down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let app = TestApp::with_upload(Some(upload_config(&server)));
    let template = template(solid_scene("#ffffff"));

    let failed = app
        .state
        .thumbnails
        .generate_and_upload("rec-2", &template, &VariableMap::new())
        .await;
    assert!(!failed.success);
    let error = failed.error.unwrap();
    assert!(error.contains("500"), "{error}");
    assert!(error.contains("storage down"), "{error}");

    let retried = app
        .state
        .thumbnails
        .generate_and_upload("rec-2", &template, &VariableMap::new())
        .await;
    assert!(retried.success);
    assert!(!retried.skipped);
}

#[tokio::test]
async fn test_thumbnail_is_small_png() {
    let app = TestApp::new();
    let png = app
        .exporter()
        .thumbnail_png(&template(solid_scene("#ff0000")), &VariableMap::new(), 421)
        .await
        .unwrap();

    assert!(is_png(&png));
    assert_eq!(png_size(&png), (421, 298));
    assert_eq!(png_pixel(&png, 200, 150), [255, 0, 0]);
}

#[tokio::test]
async fn test_thumbnail_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/certificados/abc%20d/thumbnail"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let app = TestApp::with_upload(Some(upload_config(&server)));
    let body = json!({
        "recordId": "abc d",
        "template": {"front": certificate_scene()},
        "variables": student_variables_json("Ana")
    });

    let response = app.post_json("/api/thumbnails", &body).await;
    assert_ok(&response);
    let json: Value = response.json();
    assert_eq!(json, json!({"success": true, "skipped": false}));

    let missing_id = app
        .post_json(
            "/api/thumbnails",
            &json!({"recordId": " ", "template": {"front": certificate_scene()}}),
        )
        .await;
    assert_status(&missing_id, StatusCode::BAD_REQUEST);
}
