//! Materializes processed scenes onto a [`Surface`].
//!
//! Loading runs in fixed steps: normalize the background, materialize
//! every node (fetching bitmaps and fitting images whose true size was
//! unknown at substitution time), re-flow text against the loaded fonts,
//! swap QR markers for generated codes, then lock everything.

use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use crate::error::LoadError;
use crate::models::{
    AppConfig, FailurePolicy, Geometry, ImageNode, QrPlaceholderNode, ReflowConfig,
    SceneDocument, SceneNode, ShapeNode,
};
use crate::rendering::text_layout::{layout_text, TextMeasure};
use crate::rendering::{Surface, SurfaceObject};
use crate::services::font_service::FontService;
use crate::services::image_source::ImageSource;
use crate::services::qr_injector::QrInjector;

pub struct SceneLoader {
    fonts: Arc<FontService>,
    images: Arc<dyn ImageSource>,
    qr: QrInjector,
    reflow: ReflowConfig,
    on_missing_image: FailurePolicy,
}

impl SceneLoader {
    pub fn new(
        config: Arc<AppConfig>,
        fonts: Arc<FontService>,
        images: Arc<dyn ImageSource>,
    ) -> Self {
        Self {
            fonts,
            images,
            reflow: config.reflow,
            on_missing_image: config.export.on_missing_image,
            qr: QrInjector::new(config),
        }
    }

    /// Replace the surface contents with `scene`
    pub async fn load(
        &self,
        surface: &mut Surface,
        scene: &SceneDocument,
        certificate_id: Option<&str>,
    ) -> Result<(), LoadError> {
        surface.clear();
        surface.background = scene.background.clone();

        let nodes = with_background(&scene.objects, surface.width, surface.height);

        let mut objects = self.materialize_all(nodes).await?;

        self.reflow_text(&mut objects).await;
        self.inject_qr_codes(&mut objects, certificate_id).await?;

        for object in &mut objects {
            object.lock();
        }
        tracing::debug!(objects = objects.len(), "Scene loaded");
        surface.objects = objects;
        Ok(())
    }

    fn materialize(&self, node: SceneNode) -> BoxFuture<'_, Result<SurfaceObject, LoadError>> {
        async move {
            match node {
                SceneNode::Group(mut group) => {
                    let children = std::mem::take(&mut group.objects);
                    let children = self.materialize_all(children).await?;
                    Ok(SurfaceObject::new(SceneNode::Group(group)).with_children(children))
                }
                SceneNode::Placeholder(mut placeholder) => {
                    let children = std::mem::take(&mut placeholder.objects);
                    let children = self.materialize_all(children).await?;
                    Ok(SurfaceObject::new(SceneNode::Placeholder(placeholder))
                        .with_children(children))
                }
                SceneNode::Image(image) => self.materialize_image(image).await,
                other => Ok(SurfaceObject::new(other)),
            }
        }
        .boxed()
    }

    async fn materialize_all(&self, nodes: Vec<SceneNode>) -> Result<Vec<SurfaceObject>, LoadError> {
        let mut objects = Vec::with_capacity(nodes.len());
        for node in nodes {
            objects.push(self.materialize(node).await?);
        }
        Ok(objects)
    }

    async fn materialize_image(&self, mut image: ImageNode) -> Result<SurfaceObject, LoadError> {
        match self.images.fetch(&image.src).await {
            Ok(bitmap) => {
                fit_image(&mut image, bitmap.width as f64, bitmap.height as f64);
                Ok(SurfaceObject::new(SceneNode::Image(image)).with_bitmap(bitmap))
            }
            Err(e) if self.on_missing_image == FailurePolicy::Warn => {
                tracing::warn!(error = %e, "Skipping image that failed to load");
                Ok(SurfaceObject::new(SceneNode::Image(image)))
            }
            Err(e) => Err(e),
        }
    }

    /// Lay out all text, retrying while fonts may still be arriving.
    ///
    /// Stops after the first pass once fonts are ready, or when two
    /// consecutive passes produce the same line counts.
    async fn reflow_text(&self, objects: &mut [SurfaceObject]) {
        let attempts = self.reflow.max_attempts.max(1);
        let mut previous: Option<Vec<usize>> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                if let Err(e) = self.fonts.ensure_loaded().await {
                    tracing::warn!(error = %e, "Fonts unavailable during text reflow");
                }
                tokio::time::sleep(self.reflow.retry_delay()).await;
            }

            let metrics = self.fonts.metrics();
            let mut counts = Vec::new();
            layout_all(objects, &metrics, &mut counts);

            if self.fonts.is_ready() || previous.as_ref() == Some(&counts) {
                tracing::debug!(attempt, "Text layout settled");
                return;
            }
            previous = Some(counts);
        }
        tracing::debug!(attempts, "Text layout did not settle, keeping last pass");
    }

    async fn inject_qr_codes(
        &self,
        objects: &mut [SurfaceObject],
        certificate_id: Option<&str>,
    ) -> Result<(), LoadError> {
        let mut placeholders = Vec::new();
        collect_qr_placeholders(objects, &mut placeholders);
        if placeholders.is_empty() {
            return Ok(());
        }

        let refs: Vec<&QrPlaceholderNode> = placeholders.iter().collect();
        let generated = self.qr.inject_all(&refs, certificate_id).await?;
        tracing::debug!(count = generated.len(), "Injected QR codes");

        replace_qr_placeholders(objects, &mut generated.into_iter());
        Ok(())
    }
}

/// Scene nodes with exactly one background, first, sized to the canvas.
///
/// An existing background keeps its fill; duplicates are dropped; a white
/// one is inserted when none exists.
pub fn with_background(nodes: &[SceneNode], width: f64, height: f64) -> Vec<SceneNode> {
    let mut background = None;
    let mut rest = Vec::with_capacity(nodes.len() + 1);

    for node in nodes {
        if node.is_background() {
            if background.is_none() {
                background = Some(node.clone());
            } else {
                tracing::debug!("Dropping duplicate background node");
            }
        } else {
            rest.push(node.clone());
        }
    }

    let mut background =
        background.unwrap_or_else(|| SceneNode::Shape(ShapeNode::background(width, height, None)));
    if let Some(geometry) = background.geometry_mut() {
        *geometry = Geometry {
            width,
            height,
            origin_x: Some("left".to_string()),
            origin_y: Some("top".to_string()),
            opacity: geometry.opacity,
            ..Geometry::default()
        };
    }

    let mut objects = Vec::with_capacity(rest.len() + 1);
    objects.push(background);
    objects.extend(rest);
    objects
}

/// Set an image to its natural size and scale it into its fit box.
///
/// Applies to signature images and to images carrying a fit box; the
/// box defaults to the node's current footprint. Other images keep their
/// geometry, except that a missing size is taken from the bitmap.
pub fn fit_image(image: &mut ImageNode, natural_width: f64, natural_height: f64) {
    if natural_width <= 0.0 || natural_height <= 0.0 {
        return;
    }

    let has_fit_box = image.meta.target_width.is_some() || image.meta.target_height.is_some();
    if !image.is_signature() && !has_fit_box {
        if image.geometry.width <= 0.0 || image.geometry.height <= 0.0 {
            image.geometry.width = natural_width;
            image.geometry.height = natural_height;
        }
        return;
    }

    let (footprint_w, footprint_h) = image.geometry.footprint();
    let target_w = image.meta.target_width.unwrap_or(footprint_w);
    let target_h = image.meta.target_height.unwrap_or(footprint_h);
    let scale = (target_h / natural_height).min(target_w / natural_width);

    image.geometry.width = natural_width;
    image.geometry.height = natural_height;
    image.geometry.scale_x = scale;
    image.geometry.scale_y = scale;
}

/// Lay out every text node, recording line counts in traversal order
fn layout_all(objects: &mut [SurfaceObject], measure: &dyn TextMeasure, counts: &mut Vec<usize>) {
    for object in objects {
        match &mut object.node {
            SceneNode::Textbox(text) => {
                let layout = layout_text(text, true, measure);
                text.geometry.width = layout.width;
                text.geometry.height = layout.height;
                text.dirty = None;
                counts.push(layout.line_count());
                object.layout = Some(layout);
            }
            SceneNode::Text(text) => {
                let layout = layout_text(text, false, measure);
                text.geometry.width = layout.width;
                text.geometry.height = layout.height;
                text.dirty = None;
                counts.push(layout.line_count());
                object.layout = Some(layout);
            }
            _ => layout_all(&mut object.children, measure, counts),
        }
    }
}

fn collect_qr_placeholders(objects: &[SurfaceObject], out: &mut Vec<QrPlaceholderNode>) {
    for object in objects {
        match &object.node {
            SceneNode::QrPlaceholder(placeholder) => out.push(placeholder.clone()),
            _ => collect_qr_placeholders(&object.children, out),
        }
    }
}

fn replace_qr_placeholders(
    objects: &mut [SurfaceObject],
    generated: &mut impl Iterator<Item = SurfaceObject>,
) {
    for object in objects {
        if matches!(object.node, SceneNode::QrPlaceholder(_)) {
            if let Some(replacement) = generated.next() {
                *object = replacement;
            }
        } else {
            replace_qr_placeholders(&mut object.children, generated);
        }
    }
}
