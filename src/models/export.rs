use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

use super::canvas::{Orientation, PageSide};

/// A4 in millimetres (portrait)
const A4_WIDTH_MM: f64 = 210.0;
const A4_HEIGHT_MM: f64 = 297.0;
const MM_PER_INCH: f64 = 25.4;

/// Print resolution for document exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// 72 dpi
    Low,
    /// 150 dpi
    Medium,
    /// 300 dpi
    High,
    /// 600 dpi
    Maximum,
}

impl QualityTier {
    pub fn dpi(self) -> u32 {
        match self {
            QualityTier::Low => 72,
            QualityTier::Medium => 150,
            QualityTier::High => 300,
            QualityTier::Maximum => 600,
        }
    }

    /// Pixel size of an A4 page at this tier's resolution
    pub fn a4_pixels(self, orientation: Orientation) -> (u32, u32) {
        let to_px = |mm: f64| (mm / MM_PER_INCH * self.dpi() as f64).round() as u32;
        let (w, h) = (to_px(A4_WIDTH_MM), to_px(A4_HEIGHT_MM));
        match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }

    /// Pick a format from a file extension (`.jpg`, `.webp`, otherwise PNG)
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => ImageFormat::Jpeg,
            Some("webp") => ImageFormat::Webp,
            _ => ImageFormat::Png,
        }
    }
}

/// Where an export ends up. Exactly one mode per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Write the file into the configured downloads directory
    Download,
    /// Return the encoded bytes
    Blob,
    /// Return a base64 data URI
    Base64,
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageExportOptions {
    #[serde(default)]
    pub format: ImageFormat,
    /// Encoder quality 1-100 (JPEG only)
    #[serde(default)]
    pub quality: Option<u8>,
    /// Multiplier over the native canvas size, clamped to 1-4
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    #[schema(value_type = String)]
    pub side: PageSide,
    pub output: OutputMode,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl ImageExportOptions {
    pub fn new(output: OutputMode) -> Self {
        Self {
            format: ImageFormat::Png,
            quality: None,
            scale: 1.0,
            side: PageSide::Front,
            output,
            file_name: None,
        }
    }

    pub fn clamped_scale(&self) -> f32 {
        if self.scale.is_finite() {
            self.scale.clamp(1.0, 4.0)
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentExportOptions {
    /// Defaults to the configured tier
    #[serde(default)]
    pub quality: Option<QualityTier>,
    pub output: OutputMode,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl DocumentExportOptions {
    pub fn new(output: OutputMode) -> Self {
        Self {
            quality: None,
            output,
            file_name: None,
        }
    }
}

/// Per-item metadata of a batch export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    #[serde(default)]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// One certificate of a batch.
///
/// Variables are kept raw so a malformed map fails only its own item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchItem {
    #[schema(value_type = Object)]
    pub variables: Value,
    #[serde(default)]
    pub metadata: BatchMetadata,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    use base64::Engine;
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Successful export output, shaped by the requested [`OutputMode`]
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportPayload {
    Saved {
        #[schema(value_type = String)]
        path: PathBuf,
    },
    Blob {
        mime: String,
        #[serde(serialize_with = "serialize_base64")]
        #[schema(value_type = String, format = Byte)]
        bytes: Vec<u8>,
    },
    DataUri {
        uri: String,
    },
}

/// Outcome of one export call.
///
/// Failures are reported here rather than raised, so batch items and HTTP
/// callers see the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExportPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub file_name: String,
}

impl ExportResult {
    pub fn ok(file_name: String, payload: ExportPayload) -> Self {
        Self {
            success: true,
            data: Some(payload),
            error: None,
            file_name,
        }
    }

    pub fn failed(file_name: String, error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            file_name,
        }
    }
}

/// Replace everything outside `[A-Za-z0-9_.-]` with `_`
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "certificado".to_string()
    } else {
        cleaned
    }
}
