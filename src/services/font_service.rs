use ab_glyph::{Font, FontRef};
use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use std::sync::{Arc, RwLock};

use crate::error::FontError;
use crate::models::{FailurePolicy, FontConfig, FontSource};
use crate::rendering::text_layout::{ApproximateMeasure, FontSpec, TextMeasure};
use crate::services::load_cache::LoadCache;

/// Load cache key of the configured font set
const FONTS_KEY: &str = "fonts";

/// Font database shared by text measurement and SVG rasterization.
///
/// The configured fonts are loaded at most once per cache; concurrent
/// renders wait for the load in flight. Loading is bounded by the
/// configured timeout, and under [`FailurePolicy::Warn`] a failed or slow
/// load is logged and rendering continues with the fonts available.
pub struct FontService {
    config: FontConfig,
    database: RwLock<Arc<Database>>,
    cache: Arc<LoadCache>,
    client: reqwest::Client,
}

impl FontService {
    pub fn new(config: FontConfig, cache: Arc<LoadCache>, client: reqwest::Client) -> Self {
        let mut database = Database::new();
        if config.system_fonts {
            database.load_system_fonts();
        }
        tracing::debug!(font_count = database.len(), "Base font database ready");

        Self {
            config,
            database: RwLock::new(Arc::new(database)),
            cache,
            client,
        }
    }

    /// Current font database snapshot
    pub fn database(&self) -> Arc<Database> {
        self.database
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Text measurement backed by the current font database
    pub fn metrics(&self) -> FontMetrics {
        FontMetrics {
            database: self.database(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.cache.has(FONTS_KEY)
    }

    /// Load the configured fonts unless that already happened
    pub async fn ensure_loaded(&self) -> Result<(), FontError> {
        let timeout = self.config.load_timeout();
        let policy = self.config.on_failure;

        self.cache
            .get_or_load(FONTS_KEY, || async move {
                let result = match tokio::time::timeout(timeout, self.load_all(policy)).await {
                    Ok(result) => result,
                    Err(_) => Err(FontError::Timeout(timeout)),
                };
                match (result, policy) {
                    (Ok(()), _) => Ok(()),
                    (Err(e), FailurePolicy::Warn) => {
                        tracing::warn!(error = %e, "Font loading failed, continuing with available fonts");
                        Ok(())
                    }
                    (Err(e), FailurePolicy::Fail) => Err(e),
                }
            })
            .await
            .map(|_| ())
    }

    async fn load_all(&self, policy: FailurePolicy) -> Result<(), FontError> {
        let mut database = (*self.database()).clone();
        let before = database.len();

        if let Some(dir) = &self.config.dir {
            database.load_fonts_dir(dir);
            tracing::debug!(dir = %dir.display(), "Scanned font directory");
        }

        for source in &self.config.sources {
            match self.load_source(&mut database, source).await {
                Ok(()) => tracing::debug!(family = %source.family, "Loaded font"),
                Err(e) if policy == FailurePolicy::Warn => {
                    tracing::warn!(family = %source.family, error = %e, "Skipping font");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            loaded = database.len().saturating_sub(before),
            font_count = database.len(),
            "Fonts loaded"
        );

        *self.database.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(database);
        Ok(())
    }

    async fn load_source(
        &self,
        database: &mut Database,
        source: &FontSource,
    ) -> Result<(), FontError> {
        if let Some(path) = &source.path {
            database
                .load_font_file(path)
                .map_err(|e| FontError::Read {
                    path: path.clone(),
                    source: e,
                })?;
        }

        if let Some(url) = &source.url {
            let fetch_error = |e: reqwest::Error| FontError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            };
            let bytes = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(fetch_error)?
                .bytes()
                .await
                .map_err(fetch_error)?;
            database.load_font_data(bytes.to_vec());
        }

        Ok(())
    }
}

/// First family of a CSS font-family list, unquoted
pub fn primary_family(family: &str) -> &str {
    family
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
}

/// Glyph-advance measurement over a font database snapshot.
///
/// Falls back to a fixed per-character estimate when no face matches.
#[derive(Clone)]
pub struct FontMetrics {
    database: Arc<Database>,
}

impl FontMetrics {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    fn advance(&self, text: &str, font: &FontSpec<'_>) -> Option<f64> {
        let family = font.family.map(primary_family).filter(|f| !f.is_empty());
        let mut families = Vec::with_capacity(2);
        if let Some(name) = family {
            families.push(Family::Name(name));
        }
        families.push(Family::SansSerif);

        let query = Query {
            families: &families,
            weight: Weight(font.weight),
            stretch: Stretch::Normal,
            style: if font.italic {
                Style::Italic
            } else {
                Style::Normal
            },
        };
        let id = self.database.query(&query)?;

        self.database
            .with_face_data(id, |data, index| {
                let face = FontRef::try_from_slice_and_index(data, index).ok()?;
                let units_per_em = face.units_per_em()? as f64;
                let mut width = 0.0f64;
                let mut previous = None;
                for ch in text.chars() {
                    let glyph = face.glyph_id(ch);
                    if let Some(prev) = previous {
                        width += face.kern_unscaled(prev, glyph) as f64;
                    }
                    width += face.h_advance_unscaled(glyph) as f64;
                    previous = Some(glyph);
                }
                Some(width * font.size / units_per_em)
            })
            .flatten()
    }
}

impl TextMeasure for FontMetrics {
    fn measure(&self, text: &str, font: &FontSpec<'_>) -> f64 {
        self.advance(text, font)
            .unwrap_or_else(|| ApproximateMeasure.measure(text, font))
    }
}
