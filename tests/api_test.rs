//! HTTP API tests over the shared router.

mod common;

use axum::http::StatusCode;
use base64::Engine;
use common::fixtures::*;
use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app.get("/health").await;
    assert_ok(&response);
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_render_image_blob_returns_raw_png() {
    let app = TestApp::new();
    let body = json!({
        "template": {
            "front": solid_scene("#ff0000"),
            "canvasWidth": 842,
            "canvasHeight": 595,
            "certificateId": "cert-7"
        },
        "options": {"format": "png", "output": "blob"}
    });

    let response = app.post_json("/api/render/image", &body).await;

    assert_file(&response, "image/png");
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename=\"certificado_cert-7.png\"")
    );
    assert!(is_png(&response.body));
}

#[tokio::test]
async fn test_render_image_base64_returns_json() {
    let app = TestApp::new();
    let variables = base64::engine::general_purpose::STANDARD
        .encode(student_variables_json("Ana").to_string());
    let body = json!({
        "template": {"front": certificate_scene().to_string()},
        "variables": variables,
        "options": {"output": "base64", "fileName": "ana"}
    });

    let response = app.post_json("/api/render/image", &body).await;

    assert_ok(&response);
    let json: Value = response.json();
    assert_eq!(json["success"], true);
    assert_eq!(json["fileName"], "ana.png");
    assert_eq!(json["data"]["kind"], "data_uri");
    assert!(json["data"]["uri"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_render_document_blob_returns_pdf() {
    let app = TestApp::new();
    let body = json!({
        "template": {
            "front": certificate_scene(),
            "back": solid_scene("#0000ff")
        },
        "variables": student_variables_json("Ana"),
        "options": {"quality": "low", "output": "blob"}
    });

    let response = app.post_json("/api/render/document", &body).await;

    assert_file(&response, "application/pdf");
    assert!(is_pdf(&response.body));
}

#[tokio::test]
async fn test_render_failure_is_unprocessable() {
    let app = TestApp::new();
    let body = json!({
        "template": {"front": "{nope"},
        "options": {"output": "blob"}
    });

    let response = app.post_json("/api/render/document", &body).await;

    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
    let json: Value = response.json();
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("Invalid scene JSON"));
}

#[tokio::test]
async fn test_malformed_variables_are_rejected() {
    let app = TestApp::new();
    let body = json!({
        "template": {"front": solid_scene("#ffffff")},
        "variables": "not base64 at all!",
        "options": {"output": "blob"}
    });

    let response = app.post_json("/api/render/image", &body).await;

    assert_status(&response, StatusCode::BAD_REQUEST);
    assert_json_status(&response, 400);
}

#[tokio::test]
async fn test_render_batch() {
    let app = TestApp::new();
    let body = json!({
        "template": {"front": certificate_scene()},
        "items": [
            {"variables": student_variables_json("Ana"), "metadata": {"fileName": "ana"}},
            {"variables": 42},
            {"variables": student_variables_json("Bia"), "metadata": {"certificateId": "b-2"}}
        ],
        "options": {"quality": "low", "output": "base64"}
    });

    let response = app.post_json("/api/render/batch", &body).await;

    assert_ok(&response);
    let json: Value = response.json();
    assert_eq!(json["total"], 3);
    assert_eq!(json["succeeded"], 2);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["results"][0]["fileName"], "ana.pdf");
    assert_eq!(json["results"][1]["success"], false);
    assert_eq!(json["results"][2]["fileName"], "certificado_b-2.pdf");
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let app = TestApp::new();
    let body = json!({
        "template": {"front": solid_scene("#ffffff")},
        "items": [],
        "options": {"output": "base64"}
    });

    let response = app.post_json("/api/render/batch", &body).await;
    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_variables_endpoint() {
    let app = TestApp::new();
    let body = json!({
        "scene": certificate_scene(),
        "variables": {"nome_do_aluno": {"type": "string", "value": "Ana"}}
    });

    let response = app.post_json("/api/variables", &body).await;

    assert_ok(&response);
    let json: Value = response.json();
    assert_eq!(json["text"], json!(["curso", "nome_do_aluno"]));
    assert_eq!(json["placeholders"], json!(["assinatura"]));
    assert_eq!(json["missing"], json!(["assinatura", "curso"]));
    assert_eq!(json["complete"], false);
}

#[tokio::test]
async fn test_variables_endpoint_rejects_bad_scene() {
    let app = TestApp::new();
    let response = app
        .post_json("/api/variables", &json!({"scene": "{oops"}))
        .await;

    assert_status(&response, StatusCode::BAD_REQUEST);
    assert_json_status(&response, 400);
}

#[tokio::test]
async fn test_thumbnails_unavailable_without_upload_config() {
    let app = TestApp::new();
    let body = json!({
        "recordId": "abc",
        "template": {"front": solid_scene("#ffffff")}
    });

    let response = app.post_json("/api/thumbnails", &body).await;

    assert_status(&response, StatusCode::SERVICE_UNAVAILABLE);
    assert_json_status(&response, 503);
}

/// Scene whose only node is a full-canvas image
fn image_scene(src: &str) -> Value {
    json!({
        "objects": [
            {"type": "image", "src": src, "left": 0, "top": 0, "width": 10, "height": 10,
             "scaleX": 84.2, "scaleY": 59.5}
        ]
    })
}

fn render_image_body(src: &str) -> Value {
    json!({
        "template": {"front": image_scene(src)},
        "options": {"format": "png", "output": "blob"}
    })
}

#[tokio::test]
async fn test_render_does_not_read_local_files() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("red.png");
    std::fs::write(&file, png_bytes(10, 10, [255, 0, 0])).unwrap();
    let file = file.to_str().unwrap().to_string();

    let app = TestApp::new();
    let mut errors = Vec::new();
    for src in [file.as_str(), "/etc/passwd", "/nonexistent/seal.png"] {
        let response = app.post_json("/api/render/image", &render_image_body(src)).await;
        assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);

        let json: Value = response.json();
        let error = json["error"].as_str().unwrap().to_string();
        assert!(error.contains("local image paths are not allowed"), "{error}");
        assert!(!error.contains(src), "{error}");
        errors.push(error);
    }

    // An existing file cannot be told apart from a missing one
    assert_eq!(errors[0], errors[1]);
    assert_eq!(errors[1], errors[2]);
}

#[tokio::test]
async fn test_render_reads_images_under_configured_dir() {
    let images = tempfile::tempdir().unwrap();
    std::fs::write(images.path().join("red.png"), png_bytes(10, 10, [255, 0, 0])).unwrap();
    std::fs::write(images.path().join("notes.txt"), "not an image").unwrap();
    let base_dir = images.path().to_path_buf();
    let app = TestApp::with_config(|config| config.images.base_dir = Some(base_dir));

    let response = app
        .post_json("/api/render/image", &render_image_body("red.png"))
        .await;
    assert_file(&response, "image/png");
    assert_eq!(png_pixel(&response.body, 421, 297), [255, 0, 0]);

    for src in ["../red.png", "/etc/passwd", "file:///etc/passwd"] {
        let response = app.post_json("/api/render/image", &render_image_body(src)).await;
        assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
        let json: Value = response.json();
        assert!(json["error"]
            .as_str()
            .unwrap()
            .contains("must be relative to the image directory"));
    }

    let missing = app
        .post_json("/api/render/image", &render_image_body("missing.png"))
        .await;
    let garbage = app
        .post_json("/api/render/image", &render_image_body("notes.txt"))
        .await;
    assert_status(&missing, StatusCode::UNPROCESSABLE_ENTITY);
    let missing: Value = missing.json();
    let garbage: Value = garbage.json();
    assert_eq!(missing["error"], garbage["error"]);
    assert!(missing["error"]
        .as_str()
        .unwrap()
        .ends_with("image not available"));
}

#[tokio::test]
async fn test_render_rejects_oversized_image() {
    let app = TestApp::new();
    let body = json!({
        "template": {
            "front": solid_scene("#ff0000"),
            "canvasWidth": 4096,
            "canvasHeight": 4096
        },
        "options": {"format": "png", "scale": 4, "output": "blob"}
    });

    let response = app.post_json("/api/render/image", &body).await;

    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
    let json: Value = response.json();
    assert_eq!(json["success"], false);
    assert_eq!(
        json["error"],
        "Render failed: Image too large: 16384x16384 (max 64000000 pixels)"
    );
}
