use base64::Engine;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ExportError, RenderError};
use crate::models::{
    sanitize_file_name, AppConfig, BatchItem, CertificateTemplate, DocumentExportOptions,
    ExportPayload, ExportResult, ImageExportOptions, ImageFormat, OutputMode, PageSide,
    ProcessedCanvasData, VariableMap,
};
use crate::rendering::raster::{check_size, encode, optimize_png, rgb_bytes};
use crate::rendering::{build_pdf, render_svg, PageImage, Rasterizer, Surface};
use crate::services::font_service::FontService;
use crate::services::image_source::ImageSource;
use crate::services::scene_loader::SceneLoader;
use crate::services::substitution::{try_substitute, validate_variables};

const PDF_MIME: &str = "application/pdf";

/// Renders certificate templates to images and PDF documents.
///
/// Exports are serialized: the render lock admits one export at a time,
/// and the CPU-heavy rasterization runs on the blocking pool.
pub struct CertificateExporter {
    config: Arc<AppConfig>,
    fonts: Arc<FontService>,
    loader: SceneLoader,
    render_lock: Mutex<()>,
}

impl CertificateExporter {
    pub fn new(
        config: Arc<AppConfig>,
        fonts: Arc<FontService>,
        images: Arc<dyn ImageSource>,
    ) -> Self {
        Self {
            loader: SceneLoader::new(config.clone(), fonts.clone(), images),
            config,
            fonts,
            render_lock: Mutex::new(()),
        }
    }

    /// Substitute variables into both sides of a template
    pub fn prepare(
        &self,
        template: &CertificateTemplate,
        variables: &VariableMap,
    ) -> Result<ProcessedCanvasData, ExportError> {
        let front = try_substitute(&template.front, variables)?;
        let back = match &template.back {
            Some(back) if !is_blank_scene(back) => Some(try_substitute(back, variables)?),
            _ => None,
        };

        validate_variables(&front, variables);
        if let Some(back) = &back {
            validate_variables(back, variables);
        }

        Ok(ProcessedCanvasData {
            front,
            back,
            canvas: template.dimensions(),
            certificate_id: template.certificate_id.clone(),
        })
    }

    /// Render one side of a certificate to encoded image bytes
    pub async fn image_bytes(
        &self,
        template: &CertificateTemplate,
        variables: &VariableMap,
        options: &ImageExportOptions,
    ) -> Result<Vec<u8>, ExportError> {
        let scale = options.clamped_scale() as f64;
        let (native_w, native_h) = template.dimensions().pixel_size();
        let width = (native_w as f64 * scale).round() as u32;
        let height = (native_h as f64 * scale).round() as u32;
        check_size(width, height)?;

        let format = options.format;
        if options.quality.is_some() && format != ImageFormat::Jpeg {
            tracing::debug!(format = format.extension(), "Quality ignored for lossless format");
        }
        let quality = options.quality.unwrap_or(self.config.export.jpeg_quality);

        let _guard = self.render_lock.lock().await;
        self.fonts.ensure_loaded().await?;

        let data = self.prepare(template, variables)?;
        let svg = self.load_svg(&data, options.side).await?;
        let rasterizer = Rasterizer::new(self.fonts.database());

        let bytes = blocking(move || {
            let pixmap = rasterizer.rasterize(&svg, width, height)?;
            encode(&pixmap, format, quality)
        })
        .await?;

        tracing::info!(
            width,
            height,
            format = format.extension(),
            bytes = bytes.len(),
            "Rendered certificate image"
        );
        Ok(bytes)
    }

    /// Front side as an optimized PNG no wider than `max_width`
    pub async fn thumbnail_png(
        &self,
        template: &CertificateTemplate,
        variables: &VariableMap,
        max_width: u32,
    ) -> Result<Vec<u8>, ExportError> {
        let _guard = self.render_lock.lock().await;
        self.fonts.ensure_loaded().await?;

        let data = self.prepare(template, variables)?;
        let (native_w, native_h) = data.canvas.pixel_size();
        let width = native_w.min(max_width.max(1));
        let height = ((native_h as f64 * width as f64 / native_w as f64).round() as u32).max(1);

        let svg = self.load_svg(&data, PageSide::Front).await?;
        let rasterizer = Rasterizer::new(self.fonts.database());
        blocking(move || {
            let pixmap = rasterizer.rasterize(&svg, width, height)?;
            let png = encode(&pixmap, ImageFormat::Png, 100)?;
            Ok(optimize_png(png))
        })
        .await
    }

    /// Render front (and back, when present) into an A4 PDF
    pub async fn document_bytes(
        &self,
        template: &CertificateTemplate,
        variables: &VariableMap,
        options: &DocumentExportOptions,
    ) -> Result<Vec<u8>, ExportError> {
        let _guard = self.render_lock.lock().await;
        self.fonts.ensure_loaded().await?;

        let data = self.prepare(template, variables)?;
        let tier = options.quality.unwrap_or(self.config.export.default_tier);
        let orientation = data.canvas.orientation();
        let (width, height) = tier.a4_pixels(orientation);

        let mut pages = Vec::new();
        for page in data.pages() {
            let svg = self.load_svg(&data, page.id).await?;
            let rasterizer = Rasterizer::new(self.fonts.database());
            let image = blocking(move || {
                let pixmap = rasterizer.rasterize(&svg, width, height)?;
                Ok(PageImage {
                    width,
                    height,
                    rgb: rgb_bytes(&pixmap),
                })
            })
            .await?;
            pages.push(image);
        }

        let page_count = pages.len();
        let bytes = blocking(move || build_pdf(&pages, orientation)).await?;

        tracing::info!(
            pages = page_count,
            dpi = tier.dpi(),
            bytes = bytes.len(),
            "Rendered certificate document"
        );
        Ok(bytes)
    }

    pub async fn render_image(
        &self,
        template: &CertificateTemplate,
        variables: &VariableMap,
        options: &ImageExportOptions,
    ) -> ExportResult {
        let file_name = export_file_name(
            options.file_name.as_deref(),
            template.certificate_id.as_deref(),
            options.format.extension(),
        );

        let result: Result<ExportPayload, ExportError> = async {
            let bytes = self.image_bytes(template, variables, options).await?;
            self.deliver(bytes, options.format.mime(), &file_name, options.output)
                .await
        }
        .await;

        finish(file_name, result)
    }

    pub async fn render_document(
        &self,
        template: &CertificateTemplate,
        variables: &VariableMap,
        options: &DocumentExportOptions,
    ) -> ExportResult {
        let file_name = export_file_name(
            options.file_name.as_deref(),
            template.certificate_id.as_deref(),
            "pdf",
        );

        let result: Result<ExportPayload, ExportError> = async {
            let bytes = self.document_bytes(template, variables, options).await?;
            self.deliver(bytes, PDF_MIME, &file_name, options.output)
                .await
        }
        .await;

        finish(file_name, result)
    }

    /// Render one document per item, in order, pausing between items.
    ///
    /// A failing item (including a malformed variable map) is reported in
    /// its own result and does not stop the batch. `on_progress` is called
    /// with `(done, total)` after every item.
    pub async fn render_document_batch<F>(
        &self,
        template: &CertificateTemplate,
        items: &[BatchItem],
        options: &DocumentExportOptions,
        mut on_progress: F,
    ) -> Vec<ExportResult>
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = items.len();
        let pause = self.config.export.batch_pause();
        let mut results = Vec::with_capacity(total);

        for (index, item) in items.iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let mut item_template = template.clone();
            if let Some(id) = &item.metadata.certificate_id {
                item_template.certificate_id = Some(id.clone());
            }
            let mut item_options = options.clone();
            item_options.file_name = item.metadata.file_name.clone().or_else(|| {
                item_template
                    .certificate_id
                    .is_none()
                    .then(|| format!("certificado_{}", index + 1))
            });

            let result = match VariableMap::from_value(item.variables.clone()) {
                Ok(variables) => {
                    self.render_document(&item_template, &variables, &item_options)
                        .await
                }
                Err(e) => {
                    let file_name = export_file_name(
                        item_options.file_name.as_deref(),
                        item_template.certificate_id.as_deref(),
                        "pdf",
                    );
                    tracing::warn!(item = index + 1, error = %e, "Skipping batch item");
                    ExportResult::failed(file_name, e)
                }
            };

            results.push(result);
            on_progress(index + 1, total);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(total, failed, "Batch export finished");
        results
    }

    async fn load_svg(
        &self,
        data: &ProcessedCanvasData,
        side: PageSide,
    ) -> Result<String, ExportError> {
        let scene = data.scene(side).ok_or(ExportError::MissingSide(side))?;
        let mut surface = Surface::new(data.canvas);
        self.loader
            .load(&mut surface, scene, data.certificate_id.as_deref())
            .await?;
        Ok(render_svg(&surface))
    }

    async fn deliver(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        file_name: &str,
        output: OutputMode,
    ) -> Result<ExportPayload, ExportError> {
        match output {
            OutputMode::Download => {
                let path = write_atomic(&self.config.export.downloads_dir, file_name, &bytes).await?;
                tracing::info!(path = %path.display(), "Saved export");
                Ok(ExportPayload::Saved { path })
            }
            OutputMode::Blob => Ok(ExportPayload::Blob {
                mime: mime.to_string(),
                bytes,
            }),
            OutputMode::Base64 => Ok(ExportPayload::DataUri {
                uri: format!(
                    "data:{mime};base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(&bytes)
                ),
            }),
        }
    }
}

fn finish(file_name: String, result: Result<ExportPayload, ExportError>) -> ExportResult {
    match result {
        Ok(payload) => ExportResult::ok(file_name, payload),
        Err(e) => {
            tracing::error!(file = %file_name, error = %e, "Export failed");
            ExportResult::failed(file_name, e)
        }
    }
}

async fn blocking<T, F>(job: F) -> Result<T, ExportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RenderError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ExportError::Task(e.to_string()))?
        .map_err(ExportError::from)
}

/// Write through a temporary file so a failed export leaves nothing behind
async fn write_atomic(
    dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<std::path::PathBuf, ExportError> {
    let write_error = |path: &Path, source: std::io::Error| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| write_error(dir, e))?;

    let path = dir.join(file_name);
    let partial = dir.join(format!(".{file_name}.part"));
    if let Err(e) = tokio::fs::write(&partial, bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(write_error(&partial, e));
    }
    tokio::fs::rename(&partial, &path)
        .await
        .map_err(|e| write_error(&path, e))?;
    Ok(path)
}

/// A back side given as `null`, `""` or `{}` counts as absent
fn is_blank_scene(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Sanitized output name with the expected extension.
///
/// Without an explicit name, `certificado_<certificate id>` is used, or a
/// timestamp when the certificate has no id either.
pub fn export_file_name(requested: Option<&str>, certificate_id: Option<&str>, extension: &str) -> String {
    let base = match (requested, certificate_id) {
        (Some(name), _) if !name.trim().is_empty() => name.to_string(),
        (_, Some(id)) if !id.trim().is_empty() => format!("certificado_{id}"),
        _ => format!(
            "certificado_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ),
    };

    let name = sanitize_file_name(&base);
    let suffix = format!(".{extension}");
    if name.to_ascii_lowercase().ends_with(&suffix) {
        name
    } else {
        format!("{name}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_export_file_name() {
        assert_eq!(
            export_file_name(Some("Diploma Ana"), None, "pdf"),
            "Diploma_Ana.pdf"
        );
        assert_eq!(
            export_file_name(Some("ana.PDF"), None, "pdf"),
            "ana.PDF"
        );
        assert_eq!(
            export_file_name(None, Some("cert-42"), "png"),
            "certificado_cert-42.png"
        );
        let generated = export_file_name(None, None, "jpg");
        assert!(generated.starts_with("certificado_"));
        assert!(generated.ends_with(".jpg"));
    }

    #[test]
    fn test_blank_back_scene() {
        assert!(is_blank_scene(&json!(null)));
        assert!(is_blank_scene(&json!("  ")));
        assert!(is_blank_scene(&json!({})));
        assert!(!is_blank_scene(&json!({"objects": []})));
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_atomic(&dir.path().join("out"), "a.pdf", b"%PDF-")
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-");

        let names: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }
}
