use futures_util::future::try_join_all;
use serde_json::Map;
use std::sync::Arc;

use crate::error::LoadError;
use crate::models::{AppConfig, Geometry, ImageNode, NodeMeta, QrPlaceholderNode, SceneNode};
use crate::rendering::qr::{qr_png, QR_LOGICAL_SIZE};
use crate::rendering::SurfaceObject;

/// Replaces QR placeholder markers with validation QR codes
pub struct QrInjector {
    config: Arc<AppConfig>,
}

impl QrInjector {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Generate the QR image node for one placeholder.
    ///
    /// The code encodes `<origin>/certificados/<id>` and is scaled so its
    /// 200×200 logical box covers the placeholder's footprint.
    pub async fn inject(
        &self,
        placeholder: &QrPlaceholderNode,
        certificate_id: Option<&str>,
    ) -> Result<SurfaceObject, LoadError> {
        let url = self.config.validation_url(certificate_id);
        let bitmap = qr_png(&url)?;

        let g = &placeholder.geometry;
        let logical = QR_LOGICAL_SIZE as f64;
        let name = placeholder
            .meta
            .qr_code_name
            .clone()
            .or_else(|| placeholder.meta.name.clone())
            .unwrap_or_else(|| "qrcode".to_string());

        let node = ImageNode {
            tag: "image".to_string(),
            geometry: Geometry {
                left: g.left,
                top: g.top,
                width: logical,
                height: logical,
                scale_x: g.width * g.scale_x / logical,
                scale_y: g.height * g.scale_y / logical,
                angle: g.angle,
                origin_x: g.origin_x.clone(),
                origin_y: g.origin_y.clone(),
                opacity: g.opacity,
                visible: g.visible,
            },
            meta: NodeMeta {
                name: Some(name.clone()),
                qr_code_name: Some(name),
                ..NodeMeta::default()
            },
            src: bitmap.data_uri(),
            // Nearest-neighbour keeps module edges sharp
            image_smoothing: Some(false),
            extra: Map::new(),
        };

        tracing::debug!(url = %url, "Generated validation QR code");

        let mut object = SurfaceObject::new(SceneNode::Image(node)).with_bitmap(bitmap);
        object.lock();
        Ok(object)
    }

    /// Generate all codes concurrently, preserving order
    pub async fn inject_all(
        &self,
        placeholders: &[&QrPlaceholderNode],
        certificate_id: Option<&str>,
    ) -> Result<Vec<SurfaceObject>, LoadError> {
        try_join_all(
            placeholders
                .iter()
                .map(|placeholder| self.inject(placeholder, certificate_id)),
        )
        .await
    }
}
