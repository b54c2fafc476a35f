use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::VariableMap;
use crate::services::substitution::{extract_variables, missing_variables, parse_scene};

#[derive(Debug, Deserialize, ToSchema)]
pub struct VariablesRequest {
    /// Scene document as an object or JSON string
    #[schema(value_type = Object)]
    pub scene: Value,
    /// Optional variable map to check against the scene
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VariablesResponse {
    /// Keys used as `{{key}}` in text
    pub text: Vec<String>,
    /// Names of image placeholder slots
    pub placeholders: Vec<String>,
    /// Referenced names without a non-blank value
    pub missing: Vec<String>,
    pub complete: bool,
}

/// List the variables a scene refers to
///
/// When a variable map is supplied, names without a value are reported as
/// missing. Missing variables never block a render.
#[utoipa::path(
    post,
    path = "/api/variables",
    request_body = VariablesRequest,
    responses(
        (status = 200, description = "Referenced variables", body = VariablesResponse),
        (status = 400, description = "Invalid scene or variable map"),
    ),
    tag = "Variables"
)]
pub async fn handle_variables(
    Json(request): Json<VariablesRequest>,
) -> Result<Json<VariablesResponse>, ApiError> {
    let document = parse_scene(&request.scene)?;
    let variables = VariableMap::decode(request.variables)?;

    let found = extract_variables(&document);
    let missing = missing_variables(&document, &variables);

    tracing::debug!(
        text = found.text.len(),
        placeholders = found.placeholders.len(),
        missing = missing.len(),
        "Extracted scene variables"
    );

    Ok(Json(VariablesResponse {
        text: found.text.into_iter().collect(),
        placeholders: found.placeholders.into_iter().collect(),
        complete: missing.is_empty(),
        missing,
    }))
}
