use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{
    BatchItem, CertificateTemplate, DocumentExportOptions, ExportPayload, ExportResult,
    ImageExportOptions, VariableMap,
};
use crate::server::AppState;

/// Render one side of a certificate to an image
#[derive(Debug, Deserialize, ToSchema)]
pub struct RenderImageRequest {
    /// Certificate template (`front`, optional `back`, canvas size, id)
    #[schema(value_type = Object)]
    pub template: CertificateTemplate,
    /// Variable map as an object, a JSON string or base64
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Value,
    pub options: ImageExportOptions,
}

/// Render a certificate into an A4 PDF
#[derive(Debug, Deserialize, ToSchema)]
pub struct RenderDocumentRequest {
    #[schema(value_type = Object)]
    pub template: CertificateTemplate,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Value,
    pub options: DocumentExportOptions,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenderBatchRequest {
    #[schema(value_type = Object)]
    pub template: CertificateTemplate,
    pub items: Vec<BatchItem>,
    pub options: DocumentExportOptions,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ExportResult>,
}

/// Turn an export outcome into an HTTP response.
///
/// Blob output is sent as the raw file; every other outcome as JSON.
pub fn export_response(result: ExportResult) -> Response {
    match result {
        ExportResult {
            success: true,
            data: Some(ExportPayload::Blob { mime, bytes }),
            file_name,
            ..
        } => (
            [
                (header::CONTENT_TYPE, mime),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file_name}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        result if result.success => Json(result).into_response(),
        result => (StatusCode::UNPROCESSABLE_ENTITY, Json(result)).into_response(),
    }
}

/// Render a certificate image
///
/// With `output: blob` the encoded image is returned directly; `base64` and
/// `download` return an export result.
#[utoipa::path(
    post,
    path = "/api/render/image",
    request_body = RenderImageRequest,
    responses(
        (status = 200, description = "Image bytes (blob) or export result", body = ExportResult),
        (status = 400, description = "Malformed variable map"),
        (status = 422, description = "Render failed", body = ExportResult),
    ),
    tag = "Render"
)]
pub async fn handle_render_image(
    State(state): State<AppState>,
    Json(request): Json<RenderImageRequest>,
) -> Result<Response, ApiError> {
    let variables = VariableMap::decode(request.variables)?;

    tracing::info!(
        certificate_id = ?request.template.certificate_id,
        format = request.options.format.extension(),
        output = ?request.options.output,
        "Image render requested"
    );

    let result = state
        .exporter
        .render_image(&request.template, &variables, &request.options)
        .await;
    Ok(export_response(result))
}

/// Render a certificate PDF
///
/// One A4 page per side, front first.
#[utoipa::path(
    post,
    path = "/api/render/document",
    request_body = RenderDocumentRequest,
    responses(
        (status = 200, description = "PDF bytes (blob) or export result", body = ExportResult),
        (status = 400, description = "Malformed variable map"),
        (status = 422, description = "Render failed", body = ExportResult),
    ),
    tag = "Render"
)]
pub async fn handle_render_document(
    State(state): State<AppState>,
    Json(request): Json<RenderDocumentRequest>,
) -> Result<Response, ApiError> {
    let variables = VariableMap::decode(request.variables)?;

    tracing::info!(
        certificate_id = ?request.template.certificate_id,
        quality = ?request.options.quality,
        output = ?request.options.output,
        "Document render requested"
    );

    let result = state
        .exporter
        .render_document(&request.template, &variables, &request.options)
        .await;
    Ok(export_response(result))
}

/// Render one PDF per batch item
///
/// Items are processed in order; a failing item is reported in its own
/// result and does not stop the batch.
#[utoipa::path(
    post,
    path = "/api/render/batch",
    request_body = RenderBatchRequest,
    responses(
        (status = 200, description = "Per-item results", body = BatchResponse),
        (status = 400, description = "Empty batch"),
    ),
    tag = "Render"
)]
pub async fn handle_render_batch(
    State(state): State<AppState>,
    Json(request): Json<RenderBatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    if request.items.is_empty() {
        return Err(ApiError::BadRequest("Batch has no items".to_string()));
    }

    let results = state
        .exporter
        .render_document_batch(&request.template, &request.items, &request.options, |done, total| {
            tracing::info!(done, total, "Batch progress");
        })
        .await;

    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(Json(BatchResponse {
        total: results.len(),
        succeeded,
        failed: results.len() - succeeded,
        results,
    }))
}
