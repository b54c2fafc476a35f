//! Offscreen drawing surface that scene nodes are materialized onto.

use serde_json::Value;
use uuid::Uuid;

use super::text_layout::TextLayout;
use crate::models::{CanvasDimensions, SceneNode};
use crate::services::image_source::Bitmap;

/// A node placed on a [`Surface`], together with what was resolved for it
/// while loading (text layout, fetched bitmap, materialized children).
#[derive(Debug, Clone)]
pub struct SurfaceObject {
    pub id: Uuid,
    pub node: SceneNode,
    /// Locked objects cannot be selected, moved or edited
    pub locked: bool,
    pub layout: Option<TextLayout>,
    pub bitmap: Option<Bitmap>,
    pub children: Vec<SurfaceObject>,
}

impl SurfaceObject {
    pub fn new(node: SceneNode) -> Self {
        Self {
            id: Uuid::new_v4(),
            node,
            locked: false,
            layout: None,
            bitmap: None,
            children: Vec::new(),
        }
    }

    pub fn with_bitmap(mut self, bitmap: Bitmap) -> Self {
        self.bitmap = Some(bitmap);
        self
    }

    pub fn with_children(mut self, children: Vec<SurfaceObject>) -> Self {
        self.children = children;
        self
    }

    /// Lock this object and its children, giving each a fresh id
    pub fn lock(&mut self) {
        self.locked = true;
        self.id = Uuid::new_v4();
        for child in &mut self.children {
            child.lock();
        }
    }

}

/// In-memory canvas holding materialized objects in paint order
#[derive(Debug, Clone)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
    pub background: Option<Value>,
    pub objects: Vec<SurfaceObject>,
}

impl Surface {
    pub fn new(dimensions: CanvasDimensions) -> Self {
        Self {
            width: dimensions.width,
            height: dimensions.height,
            background: None,
            objects: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.background = None;
    }
}
