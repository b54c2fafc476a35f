use async_trait::async_trait;
use base64::Engine;
use image::{ImageFormat, ImageReader};
use percent_encoding::percent_decode_str;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use crate::error::LoadError;
use crate::models::ImageConfig;
use crate::rendering::raster::MAX_PIXELS;

/// Reason reported for any local file that cannot be used, so callers
/// cannot tell a missing file from an unreadable or non-image one
const LOCAL_UNAVAILABLE: &str = "image not available";

/// Encoded image bytes plus their natural size
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub mime: &'static str,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Bitmap {
    /// Sniff and measure encoded bytes. Formats other than PNG, JPEG and
    /// GIF are re-encoded as PNG so the rasterizer can embed them.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, String> {
        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())?;

        let mime = match reader.format() {
            Some(ImageFormat::Png) => Some("image/png"),
            Some(ImageFormat::Jpeg) => Some("image/jpeg"),
            Some(ImageFormat::Gif) => Some("image/gif"),
            Some(_) => None,
            None => return Err("unrecognized image format".to_string()),
        };

        let (width, height) = reader.into_dimensions().map_err(|e| e.to_string())?;
        if width == 0 || height == 0 {
            return Err("image has no pixels".to_string());
        }
        if width as u64 * height as u64 > MAX_PIXELS {
            return Err(format!(
                "image too large: {width}x{height} (max {MAX_PIXELS} pixels)"
            ));
        }

        match mime {
            Some(mime) => Ok(Self {
                mime,
                data: bytes,
                width,
                height,
            }),
            None => Self::reencode(&bytes),
        }
    }

    fn reencode(bytes: &[u8]) -> Result<Self, String> {
        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .decode()
            .map_err(|e| e.to_string())?;
        let mut data = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .map_err(|e| e.to_string())?;
        Ok(Self {
            mime: "image/png",
            data,
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// Resolves the `src` of image nodes to decoded bitmaps
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, src: &str) -> Result<Bitmap, LoadError>;
}

/// Which local files an image `src` may name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalFiles {
    /// Only data URIs and http(s) URLs
    Denied,
    /// Relative paths that stay inside this directory
    Within(PathBuf),
    /// Any path, relative ones against the working directory (CLI)
    Unrestricted,
}

/// Handles `data:` URIs, http(s) URLs and, when allowed, local file paths
pub struct DefaultImageSource {
    client: reqwest::Client,
    local: LocalFiles,
    max_bytes: usize,
}

impl DefaultImageSource {
    /// Remote and inline sources only, with the default size cap
    pub fn new(client: reqwest::Client) -> Self {
        Self::from_config(client, &ImageConfig::default())
    }

    pub fn from_config(client: reqwest::Client, config: &ImageConfig) -> Self {
        let local = match &config.base_dir {
            Some(dir) => LocalFiles::Within(dir.clone()),
            None => LocalFiles::Denied,
        };
        Self {
            client,
            local,
            max_bytes: config.max_bytes,
        }
    }

    pub fn with_local_files(mut self, local: LocalFiles) -> Self {
        self.local = local;
        self
    }

    fn check_len(&self, len: u64) -> Result<(), String> {
        if len > self.max_bytes as u64 {
            Err(format!(
                "image too large: {len} bytes (max {})",
                self.max_bytes
            ))
        } else {
            Ok(())
        }
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        if let Some(len) = response.content_length() {
            self.check_len(len)?;
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            self.check_len((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Map a file `src` to a path the policy allows
    fn resolve_local(&self, src: &str) -> Result<PathBuf, String> {
        let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
        match &self.local {
            LocalFiles::Denied => Err("local image paths are not allowed".to_string()),
            LocalFiles::Within(base) => {
                let contained = path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
                if contained {
                    Ok(base.join(path))
                } else {
                    Err("image path must be relative to the image directory".to_string())
                }
            }
            LocalFiles::Unrestricted => Ok(path.to_path_buf()),
        }
    }

    async fn read_local(&self, path: &Path) -> Result<Bitmap, String> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| e.to_string())?;
        if !metadata.is_file() {
            return Err("not a regular file".to_string());
        }
        self.check_len(metadata.len())?;
        let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
        Bitmap::decode(bytes)
    }

    async fn load(&self, src: &str) -> Result<Bitmap, String> {
        if let Some(rest) = src.strip_prefix("data:") {
            let bytes = decode_data_uri(rest)?;
            self.check_len(bytes.len() as u64)?;
            return Bitmap::decode(bytes);
        }

        if src.starts_with("http://") || src.starts_with("https://") {
            let bytes = self.fetch_http(src).await?;
            return Bitmap::decode(bytes);
        }

        let path = self.resolve_local(src)?;
        self.read_local(&path).await.map_err(|reason| {
            tracing::debug!(path = %path.display(), %reason, "Local image unavailable");
            LOCAL_UNAVAILABLE.to_string()
        })
    }
}

#[async_trait]
impl ImageSource for DefaultImageSource {
    async fn fetch(&self, src: &str) -> Result<Bitmap, LoadError> {
        if src.trim().is_empty() {
            return Err(LoadError::Image {
                src: String::new(),
                reason: "empty source".to_string(),
            });
        }

        let bitmap = self.load(src).await.map_err(|reason| LoadError::Image {
            src: describe(src),
            reason,
        })?;
        tracing::debug!(
            src = %abbreviate(src),
            width = bitmap.width,
            height = bitmap.height,
            "Fetched image"
        );
        Ok(bitmap)
    }
}

/// `<mediatype>[;base64],<data>` after the `data:` scheme
fn decode_data_uri(rest: &str) -> Result<Vec<u8>, String> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URI without payload".to_string())?;

    if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| e.to_string())
    } else {
        Ok(percent_decode_str(payload).collect())
    }
}

/// Source as shown in errors returned to callers. File paths are left out.
fn describe(src: &str) -> String {
    if src.starts_with("data:") || src.starts_with("http://") || src.starts_with("https://") {
        abbreviate(src)
    } else {
        "(local file)".to_string()
    }
}

/// Data URIs are huge; keep log lines and errors readable
fn abbreviate(src: &str) -> String {
    const MAX: usize = 64;
    match src.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &src[..idx]),
        None => src.to_string(),
    }
}
