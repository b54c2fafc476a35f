use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::models::{PageSide, VariableError};
use crate::services::substitution::SubstitutionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Variables(#[from] VariableError),

    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("SVG parse error: {0}")]
    SvgParse(String),

    #[error("Invalid render size: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Image too large: {width}x{height} (max {max} pixels)")]
    ImageTooLarge { width: u32, height: u32, max: u64 },

    #[error("Failed to allocate pixmap")]
    PixmapAllocation,

    #[error("PNG encode error: {0}")]
    PngEncode(String),

    #[error("Image encode error: {0}")]
    ImageEncode(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("QR code error: {0}")]
    QrCode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FontError {
    #[error("Font loading timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to fetch font {url}: {reason}")]
    Fetch { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load image {src}: {reason}")]
    Image { src: String, reason: String },

    #[error("QR code injection failed: {0}")]
    QrCode(#[from] RenderError),

    #[error(transparent)]
    Font(#[from] FontError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error(transparent)]
    Variables(#[from] VariableError),

    #[error("Scene load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Font(#[from] FontError),

    #[error("Certificate has no {0:?} side")]
    MissingSide(PageSide),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Render task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No upload endpoint configured")]
    NotConfigured,

    #[error("Upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Thumbnail render failed: {0}")]
    Render(#[from] ExportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::Variables(_) | ApiError::Substitution(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Upload(UploadError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upload(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "status": status.as_u16(),
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_messages() {
        assert_eq!(
            RenderError::SvgParse("Invalid XML".to_string()).to_string(),
            "SVG parse error: Invalid XML"
        );
        assert_eq!(
            RenderError::InvalidDimensions {
                width: 0,
                height: 10
            }
            .to_string(),
            "Invalid render size: 0x10"
        );
        assert_eq!(
            RenderError::PixmapAllocation.to_string(),
            "Failed to allocate pixmap"
        );
    }

    #[test]
    fn test_load_error_image() {
        let error = LoadError::Image {
            src: "https://x/a.png".to_string(),
            reason: "404".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to load image https://x/a.png: 404"
        );
    }

    #[test]
    fn test_export_error_missing_side() {
        assert_eq!(
            ExportError::MissingSide(PageSide::Back).to_string(),
            "Certificate has no Back side"
        );
    }

    #[test]
    fn test_export_error_from_load_error() {
        let error: ExportError = LoadError::QrCode(RenderError::PixmapAllocation).into();
        assert!(matches!(error, ExportError::Load(_)));
    }

    #[test]
    fn test_api_error_into_response_status_codes() {
        let response = ApiError::BadRequest("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Upload(UploadError::NotConfigured).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = ApiError::Upload(UploadError::Rejected {
            status: 500,
            body: String::new(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_image_too_large_message() {
        let error = RenderError::ImageTooLarge {
            width: 16_384,
            height: 16_384,
            max: 64_000_000,
        };
        assert_eq!(
            error.to_string(),
            "Image too large: 16384x16384 (max 64000000 pixels)"
        );
    }
}
