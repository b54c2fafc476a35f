use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::{ApiError, UploadError};
use crate::models::{CertificateTemplate, VariableMap};
use crate::server::AppState;
use crate::services::UploadOutcome;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRequest {
    /// Backend record the thumbnail belongs to
    pub record_id: String,
    #[schema(value_type = Object)]
    pub template: CertificateTemplate,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Value,
}

/// Generate and upload a certificate thumbnail
///
/// Each record is uploaded once per server process; later requests for the
/// same record report `skipped`.
#[utoipa::path(
    post,
    path = "/api/thumbnails",
    request_body = ThumbnailRequest,
    responses(
        (status = 200, description = "Upload outcome", body = UploadOutcome),
        (status = 400, description = "Missing record id or malformed variables"),
        (status = 503, description = "No upload endpoint configured"),
    ),
    tag = "Thumbnails"
)]
pub async fn handle_thumbnail(
    State(state): State<AppState>,
    Json(request): Json<ThumbnailRequest>,
) -> Result<Json<UploadOutcome>, ApiError> {
    if !state.thumbnails.is_configured() {
        return Err(UploadError::NotConfigured.into());
    }
    let record_id = request.record_id.trim();
    if record_id.is_empty() {
        return Err(ApiError::BadRequest("recordId is required".to_string()));
    }
    let variables = VariableMap::decode(request.variables)?;

    let outcome = state
        .thumbnails
        .generate_and_upload(record_id, &request.template, &variables)
        .await;
    Ok(Json(outcome))
}
