use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::export::QualityTier;

/// Characters escaped when an id is placed in a URL path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Whether a failure in an optional step aborts the whole export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Propagate the error to the caller
    Fail,
    /// Log a warning and continue with a degraded result
    Warn,
}

/// Application configuration loaded from config.yaml
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Origin used to build QR validation URLs (`<origin>/certificados/<id>`)
    #[serde(default = "default_validation_origin")]
    pub validation_origin: String,

    /// Certificate id encoded in QR codes when a render carries none
    #[serde(default = "default_fallback_id")]
    pub fallback_certificate_id: String,

    #[serde(default)]
    pub fonts: FontConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub reflow: ReflowConfig,

    #[serde(default)]
    pub images: ImageConfig,

    /// Thumbnail upload backend (disabled when absent)
    #[serde(default)]
    pub upload: Option<UploadConfig>,
}

fn default_validation_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_fallback_id() -> String {
    "exemplo".to_string()
}

/// Web fonts loaded once per process before the first render
#[derive(Debug, Deserialize, Clone)]
pub struct FontConfig {
    /// Directory scanned for font files
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Individual font files or URLs
    #[serde(default)]
    pub sources: Vec<FontSource>,

    /// Upper bound for the whole font load
    #[serde(default = "default_font_timeout")]
    pub load_timeout_ms: u64,

    /// Also register the fonts installed on the host
    #[serde(default = "default_true")]
    pub system_fonts: bool,

    #[serde(default = "default_font_policy")]
    pub on_failure: FailurePolicy,
}

fn default_font_timeout() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_font_policy() -> FailurePolicy {
    FailurePolicy::Warn
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            dir: None,
            sources: Vec::new(),
            load_timeout_ms: default_font_timeout(),
            system_fonts: true,
            on_failure: FailurePolicy::Warn,
        }
    }
}

impl FontConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// A font file on disk or behind a URL
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FontSource {
    /// Family name the file is expected to provide (used for logging)
    pub family: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Directory that receives files for the `download` output mode
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// Pause between items of a batch export
    #[serde(default = "default_batch_pause")]
    pub batch_pause_ms: u64,

    /// Default JPEG quality for image exports
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Default tier for document exports
    #[serde(default = "default_tier")]
    pub default_tier: QualityTier,

    /// What to do when an image node cannot be fetched or decoded
    #[serde(default = "default_image_policy")]
    pub on_missing_image: FailurePolicy,
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_batch_pause() -> u64 {
    500
}

fn default_jpeg_quality() -> u8 {
    92
}

fn default_tier() -> QualityTier {
    QualityTier::High
}

fn default_image_policy() -> FailurePolicy {
    FailurePolicy::Fail
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            batch_pause_ms: default_batch_pause(),
            jpeg_quality: default_jpeg_quality(),
            default_tier: default_tier(),
            on_missing_image: default_image_policy(),
        }
    }
}

impl ExportConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

/// Bounded retry for textbox line wrapping
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ReflowConfig {
    #[serde(default = "default_reflow_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_reflow_delay")]
    pub retry_delay_ms: u64,
}

fn default_reflow_attempts() -> u32 {
    3
}

fn default_reflow_delay() -> u64 {
    150
}

impl ReflowConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ReflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_reflow_attempts(),
            retry_delay_ms: default_reflow_delay(),
        }
    }
}

/// Where image nodes may load their bitmaps from
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    /// Directory relative image paths resolve against. Without it the
    /// server only accepts data URIs and http(s) URLs.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Largest encoded image accepted from any source
    #[serde(default = "default_image_max_bytes")]
    pub max_bytes: usize,
}

fn default_image_max_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            max_bytes: default_image_max_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Endpoint URL; `{id}` is replaced by the record id
    pub endpoint: String,
    /// Multipart field carrying the file
    #[serde(default = "default_upload_field")]
    pub field: String,
}

fn default_upload_field() -> String {
    "file".to_string()
}

impl UploadConfig {
    pub fn url_for(&self, record_id: &str) -> String {
        let encoded = utf8_percent_encode(record_id, PATH_SEGMENT).to_string();
        self.endpoint.replace("{id}", &encoded)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, falling back to defaults
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::info!("No config file set, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content).unwrap_or_else(|e| {
                tracing::warn!(%e, path = %path.display(), "Failed to parse config, using defaults");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(%e, path = %path.display(), "Failed to read config, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let config: Self = serde_yaml::from_str(content)?;
        tracing::info!(
            origin = %config.validation_origin,
            font_sources = config.fonts.sources.len(),
            upload = config.upload.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// QR validation URL for a certificate
    pub fn validation_url(&self, certificate_id: Option<&str>) -> String {
        let id = certificate_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&self.fallback_certificate_id);
        let encoded = utf8_percent_encode(id, PATH_SEGMENT).to_string();
        format!(
            "{}/certificados/{}",
            self.validation_origin.trim_end_matches('/'),
            encoded
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            validation_origin: default_validation_origin(),
            fallback_certificate_id: default_fallback_id(),
            fonts: FontConfig::default(),
            export: ExportConfig::default(),
            reflow: ReflowConfig::default(),
            images: ImageConfig::default(),
            upload: None,
        }
    }
}
