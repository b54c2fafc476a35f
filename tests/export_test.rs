//! End-to-end export tests against the exporter service.

mod common;

use common::fixtures::*;
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};

use certkit::models::{
    BatchItem, BatchMetadata, CertificateTemplate, DocumentExportOptions, ExportPayload,
    ImageExportOptions, ImageFormat, OutputMode, PageSide, QualityTier, VariableMap,
};

fn blob_bytes(payload: Option<ExportPayload>) -> (String, Vec<u8>) {
    match payload {
        Some(ExportPayload::Blob { mime, bytes }) => (mime, bytes),
        other => panic!("Expected blob payload, got {other:?}"),
    }
}

fn page_sizes(pdf: &[u8]) -> Vec<(f32, f32)> {
    let doc = lopdf::Document::load_mem(pdf).expect("Invalid PDF");
    doc.get_pages()
        .values()
        .map(|&id| {
            let page = doc.get_object(id).unwrap().as_dict().unwrap();
            let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
            (media[2].as_float().unwrap(), media[3].as_float().unwrap())
        })
        .collect()
}

fn downloads(app: &TestApp) -> Vec<String> {
    match std::fs::read_dir(app.downloads.path()) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_png_blob_at_native_size() {
    let app = TestApp::new();
    let template = template(solid_scene("#ff0000"));

    let result = app
        .exporter()
        .render_image(&template, &VariableMap::new(), &ImageExportOptions::new(OutputMode::Blob))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.file_name, "certificado_cert-42.png");
    let (mime, bytes) = blob_bytes(result.data);
    assert_eq!(mime, "image/png");
    assert!(is_png(&bytes));
    assert_eq!(png_size(&bytes), (842, 595));
    assert_eq!(png_pixel(&bytes, 421, 300), [255, 0, 0]);
}

#[tokio::test]
async fn test_scale_multiplies_native_size() {
    let app = TestApp::new();
    let options = ImageExportOptions {
        scale: 2.0,
        ..ImageExportOptions::new(OutputMode::Blob)
    };

    let result = app
        .exporter()
        .render_image(&template(solid_scene("#ff0000")), &VariableMap::new(), &options)
        .await;

    let (_, bytes) = blob_bytes(result.data);
    assert_eq!(png_size(&bytes), (1684, 1190));
}

#[tokio::test]
async fn test_jpeg_export() {
    let app = TestApp::new();
    let options = ImageExportOptions {
        format: ImageFormat::Jpeg,
        quality: Some(80),
        ..ImageExportOptions::new(OutputMode::Blob)
    };

    let result = app
        .exporter()
        .render_image(&template(solid_scene("#00ff00")), &VariableMap::new(), &options)
        .await;

    assert_eq!(result.file_name, "certificado_cert-42.jpg");
    let (mime, bytes) = blob_bytes(result.data);
    assert_eq!(mime, "image/jpeg");
    assert!(is_jpeg(&bytes));
}

#[tokio::test]
async fn test_base64_never_writes_a_file() {
    let app = TestApp::new();

    let result = app
        .exporter()
        .render_image(
            &template(solid_scene("#ff0000")),
            &VariableMap::new(),
            &ImageExportOptions::new(OutputMode::Base64),
        )
        .await;

    match result.data {
        Some(ExportPayload::DataUri { uri }) => {
            assert!(uri.starts_with("data:image/png;base64,"))
        }
        other => panic!("Expected data URI, got {other:?}"),
    }
    assert!(downloads(&app).is_empty());
}

#[tokio::test]
async fn test_download_writes_file_and_returns_path() {
    let app = TestApp::new();
    let options = DocumentExportOptions {
        file_name: Some("Certificado Maria".to_string()),
        ..DocumentExportOptions::new(OutputMode::Download)
    };

    let result = app
        .exporter()
        .render_document(&template(solid_scene("#ff0000")), &VariableMap::new(), &options)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.file_name, "Certificado_Maria.pdf");
    let path = match result.data {
        Some(ExportPayload::Saved { path }) => path,
        other => panic!("Expected saved file, got {other:?}"),
    };
    assert_eq!(path, app.downloads.path().join("Certificado_Maria.pdf"));
    assert!(is_pdf(&std::fs::read(&path).unwrap()));
    assert_eq!(downloads(&app), vec!["Certificado_Maria.pdf".to_string()]);
}

#[tokio::test]
async fn test_two_sided_document_has_two_landscape_pages() {
    let app = TestApp::new();

    let result = app
        .exporter()
        .render_document(
            &two_sided_template(),
            &student_variables(),
            &DocumentExportOptions::new(OutputMode::Blob),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    let (mime, bytes) = blob_bytes(result.data);
    assert_eq!(mime, "application/pdf");

    let sizes = page_sizes(&bytes);
    assert_eq!(sizes.len(), 2);
    for (w, h) in sizes {
        assert!((w - 841.89).abs() < 0.01);
        assert!((h - 595.28).abs() < 0.01);
    }
}

#[tokio::test]
async fn test_portrait_canvas_gives_portrait_page() {
    let app = TestApp::new();
    let template = CertificateTemplate {
        canvas_width: Some(595.0),
        canvas_height: Some(842.0),
        ..template(solid_scene("#ff0000"))
    };

    let bytes = app
        .exporter()
        .document_bytes(
            &template,
            &VariableMap::new(),
            &DocumentExportOptions::new(OutputMode::Blob),
        )
        .await
        .unwrap();

    let sizes = page_sizes(&bytes);
    assert_eq!(sizes.len(), 1);
    assert!(sizes[0].0 < sizes[0].1);
}

#[tokio::test]
async fn test_quality_tier_changes_document_size() {
    let app = TestApp::new();
    let render = |tier| {
        let exporter = app.exporter();
        async move {
            let options = DocumentExportOptions {
                quality: Some(tier),
                ..DocumentExportOptions::new(OutputMode::Blob)
            };
            exporter
                .document_bytes(&template(solid_scene("#ff0000")), &VariableMap::new(), &options)
                .await
                .unwrap()
        }
    };

    let low = render(QualityTier::Low).await;
    let medium = render(QualityTier::Medium).await;
    assert!(medium.len() > low.len());
}

#[tokio::test]
async fn test_full_certificate_renders() {
    let app = TestApp::new();

    let result = app
        .exporter()
        .render_image(
            &two_sided_template(),
            &student_variables(),
            &ImageExportOptions::new(OutputMode::Blob),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    let (_, bytes) = blob_bytes(result.data);
    // QR code quiet zone and modules sit inside the 100x100 marker at (650..750, 420..520)
    let mut dark = 0;
    for y in (420..520).step_by(2) {
        for x in (650..750).step_by(2) {
            if png_pixel(&bytes, x, y)[0] < 64 {
                dark += 1;
            }
        }
    }
    assert!(dark > 100, "Expected QR modules, found {dark} dark samples");
}

#[tokio::test]
async fn test_back_side_image() {
    let app = TestApp::new();
    let options = ImageExportOptions {
        side: PageSide::Back,
        ..ImageExportOptions::new(OutputMode::Blob)
    };

    let result = app
        .exporter()
        .render_image(&two_sided_template(), &student_variables(), &options)
        .await;

    let (_, bytes) = blob_bytes(result.data);
    assert_eq!(png_pixel(&bytes, 100, 100), [0, 0, 255]);
}

#[tokio::test]
async fn test_missing_back_side_reports_failure() {
    let app = TestApp::new();
    let options = ImageExportOptions {
        side: PageSide::Back,
        ..ImageExportOptions::new(OutputMode::Download)
    };

    let result = app
        .exporter()
        .render_image(&template(solid_scene("#ff0000")), &VariableMap::new(), &options)
        .await;

    assert!(!result.success);
    assert!(result.data.is_none());
    assert!(result.error.unwrap().contains("no Back side"));
    assert!(downloads(&app).is_empty());
}

#[tokio::test]
async fn test_malformed_scene_reports_failure() {
    let app = TestApp::new();

    let result = app
        .exporter()
        .render_document(
            &template(json!("{not json")),
            &VariableMap::new(),
            &DocumentExportOptions::new(OutputMode::Download),
        )
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Invalid scene JSON"));
    assert!(downloads(&app).is_empty());
}

#[tokio::test]
async fn test_background_node_is_drawn_first() {
    let app = TestApp::new();
    // Background listed last must still end up under the red square
    let scene = json!({
        "objects": [
            {"type": "rect", "left": 0, "top": 0, "width": 100, "height": 100, "fill": "#ff0000"},
            {"type": "rect", "name": "backgroundRect", "left": 0, "top": 0, "width": 10, "height": 10, "fill": "#00ff00"}
        ]
    });

    let bytes = app
        .exporter()
        .image_bytes(
            &template(scene),
            &VariableMap::new(),
            &ImageExportOptions::new(OutputMode::Blob),
        )
        .await
        .unwrap();

    assert_eq!(png_pixel(&bytes, 50, 50), [255, 0, 0]);
    // Background was stretched to the whole canvas
    assert_eq!(png_pixel(&bytes, 800, 500), [0, 255, 0]);
}

#[tokio::test]
async fn test_batch_isolates_failures_and_reports_progress() {
    let app = TestApp::new();
    let items = vec![
        BatchItem {
            variables: student_variables_json("Ana"),
            metadata: BatchMetadata {
                certificate_id: Some("a-1".to_string()),
                file_name: None,
            },
        },
        BatchItem {
            // Not a variable map
            variables: json!(["broken"]),
            metadata: BatchMetadata::default(),
        },
        BatchItem {
            variables: student_variables_json("Bruno"),
            metadata: BatchMetadata {
                certificate_id: None,
                file_name: Some("bruno".to_string()),
            },
        },
    ];

    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = progress.clone();
    let results = app
        .exporter()
        .render_document_batch(
            &template(certificate_scene()),
            &items,
            &DocumentExportOptions::new(OutputMode::Download),
            move |done, total| seen.lock().unwrap().push((done, total)),
        )
        .await;

    assert_eq!(*progress.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(
        results.iter().map(|r| r.success).collect::<Vec<_>>(),
        vec![true, false, true]
    );
    assert_eq!(results[0].file_name, "certificado_a-1.pdf");
    assert_eq!(results[2].file_name, "bruno.pdf");

    let mut files = downloads(&app);
    files.sort();
    assert_eq!(files, vec!["bruno.pdf", "certificado_a-1.pdf"]);
}

#[tokio::test]
async fn test_batch_pause_between_items() {
    let downloads = tempfile::tempdir().unwrap();
    let mut config = test_config(downloads.path());
    config.export.batch_pause_ms = 50;
    let state = certkit::server::create_app_state(config).unwrap();

    let items: Vec<BatchItem> = (0..3)
        .map(|i| BatchItem {
            variables: student_variables_json(&format!("Aluno {i}")),
            metadata: BatchMetadata::default(),
        })
        .collect();

    let started = std::time::Instant::now();
    let results = state
        .exporter
        .render_document_batch(
            &template(solid_scene("#ffffff")),
            &items,
            &DocumentExportOptions::new(OutputMode::Base64),
            |_, _| {},
        )
        .await;

    assert!(results.iter().all(|r| r.success));
    assert!(started.elapsed() >= std::time::Duration::from_millis(100));
}
