//! Test fixtures: scenes, templates and variable maps.

use base64::Engine;
use serde_json::{json, Value};

use certkit::models::{CertificateTemplate, Variable, VariableMap};

pub const CERTIFICATE_ID: &str = "cert-42";

/// Landscape scene with text variables, an image slot and a QR marker
pub fn certificate_scene() -> Value {
    json!({
        "version": "5.3.0",
        "objects": [
            {
                "type": "textbox",
                "left": 421, "top": 120, "width": 600, "height": 40,
                "originX": "center", "originY": "center",
                "text": "CERTIFICADO",
                "fontSize": 36, "fontFamily": "Montserrat", "fill": "#1a1a1a",
                "textAlign": "center"
            },
            {
                "type": "textbox",
                "left": 421, "top": 260, "width": 640, "height": 60,
                "originX": "center", "originY": "center",
                "text": "Certificamos que {{nome_do_aluno}} concluiu o curso {{curso}}",
                "fontSize": 20, "fill": "#333333", "textAlign": "center"
            },
            {
                "type": "group",
                "left": 200, "top": 470, "width": 240, "height": 80,
                "originX": "center", "originY": "center",
                "isPlaceholder": true,
                "placeholderName": "assinatura",
                "objects": [
                    {"type": "rect", "left": -120, "top": -40, "width": 240, "height": 80, "fill": "#eeeeee"},
                    {"type": "text", "left": -60, "top": -10, "text": "📷 assinatura", "fontSize": 14}
                ]
            },
            {
                "type": "rect",
                "left": 700, "top": 470, "width": 100, "height": 100,
                "originX": "center", "originY": "center",
                "fill": "#dddddd",
                "isQRCodePlaceholder": true,
                "qrCodeName": "QR Code"
            }
        ]
    })
}

/// Scene fully covered by one solid rectangle
pub fn solid_scene(color: &str) -> Value {
    json!({
        "objects": [
            {"type": "rect", "left": 0, "top": 0, "width": 842, "height": 595, "fill": color}
        ]
    })
}

pub fn template(front: Value) -> CertificateTemplate {
    CertificateTemplate {
        front,
        back: None,
        canvas_width: Some(842.0),
        canvas_height: Some(595.0),
        certificate_id: Some(CERTIFICATE_ID.to_string()),
    }
}

/// Front and back certificate with the front given as a JSON string
pub fn two_sided_template() -> CertificateTemplate {
    CertificateTemplate {
        back: Some(solid_scene("#0000ff")),
        ..template(Value::String(certificate_scene().to_string()))
    }
}

/// Tiny solid PNG as a data URI
pub fn png_data_uri(width: u32, height: u32, rgb: [u8; 3]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png_bytes(width, height, rgb))
    )
}

pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}

pub fn student_variables() -> VariableMap {
    VariableMap::new()
        .with("nome_do_aluno", Variable::string("Maria Souza"))
        .with("curso", Variable::string("Rust Avançado"))
        .with(
            "assinatura",
            Variable::url(png_data_uri(300, 100, [20, 20, 20])),
        )
}

/// Raw variable JSON for batch items
pub fn student_variables_json(name: &str) -> Value {
    json!({
        "nome_do_aluno": {"type": "string", "value": name},
        "curso": {"type": "string", "value": "Rust"}
    })
}
