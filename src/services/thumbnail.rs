use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::UploadError;
use crate::models::{sanitize_file_name, CertificateTemplate, UploadConfig, VariableMap};
use crate::services::exporter::CertificateExporter;
use crate::services::load_cache::LoadCache;

/// Thumbnails are rendered no wider than this
pub const THUMBNAIL_MAX_WIDTH: u32 = 480;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadOutcome {
    pub success: bool,
    /// The record already had a thumbnail uploaded during this process
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    fn uploaded() -> Self {
        Self {
            success: true,
            skipped: false,
            error: None,
        }
    }

    fn skipped() -> Self {
        Self {
            success: true,
            skipped: true,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            skipped: false,
            error: Some(error.to_string()),
        }
    }
}

/// Renders certificate thumbnails and uploads them to the backend.
///
/// Each record id is uploaded at most once per process; the upload cache
/// also makes a concurrent request for the same id wait for the first.
pub struct ThumbnailService {
    exporter: Arc<CertificateExporter>,
    upload: Option<UploadConfig>,
    uploaded: Arc<LoadCache>,
    client: reqwest::Client,
}

impl ThumbnailService {
    pub fn new(
        exporter: Arc<CertificateExporter>,
        upload: Option<UploadConfig>,
        uploaded: Arc<LoadCache>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            exporter,
            upload,
            uploaded,
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.upload.is_some()
    }

    /// Render and upload the thumbnail for `record_id` unless already done
    pub async fn generate_and_upload(
        &self,
        record_id: &str,
        template: &CertificateTemplate,
        variables: &VariableMap,
    ) -> UploadOutcome {
        let Some(upload) = &self.upload else {
            return UploadOutcome::failed(UploadError::NotConfigured);
        };

        let result = self
            .uploaded
            .get_or_load(record_id, || async {
                let png = self
                    .exporter
                    .thumbnail_png(template, variables, THUMBNAIL_MAX_WIDTH)
                    .await
                    .map_err(UploadError::from)?;
                self.send(upload, record_id, png).await
            })
            .await;

        match result {
            Ok(true) => {
                tracing::info!(record_id, "Thumbnail uploaded");
                UploadOutcome::uploaded()
            }
            Ok(false) => {
                tracing::debug!(record_id, "Thumbnail already uploaded, skipping");
                UploadOutcome::skipped()
            }
            Err(e) => {
                tracing::warn!(record_id, error = %e, "Thumbnail upload failed");
                UploadOutcome::failed(e)
            }
        }
    }

    /// POST the PNG as a multipart file field
    async fn send(
        &self,
        upload: &UploadConfig,
        record_id: &str,
        png: Vec<u8>,
    ) -> Result<(), UploadError> {
        let file_name = sanitize_file_name(&format!("thumbnail_{record_id}.png"));
        let part = Part::bytes(png)
            .file_name(file_name)
            .mime_str("image/png")?;
        let form = Form::new().part(upload.field.clone(), part);

        let url = upload.url_for(record_id);
        tracing::debug!(url = %url, "Uploading thumbnail");

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
