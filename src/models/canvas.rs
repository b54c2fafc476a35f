use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::scene::SceneDocument;

/// A4 landscape in points, used when a template carries no dimensions
pub const DEFAULT_CANVAS_WIDTH: f64 = 842.0;
pub const DEFAULT_CANVAS_HEIGHT: f64 = 595.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Canvas size in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasDimensions {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasDimensions {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
        }
    }
}

impl CanvasDimensions {
    /// Build from optional template values, falling back to A4 landscape
    /// for missing or non-positive sizes.
    pub fn from_optional(width: Option<f64>, height: Option<f64>) -> Self {
        match (width, height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Self {
                width: w,
                height: h,
            },
            _ => Self::default(),
        }
    }

    pub fn orientation(&self) -> Orientation {
        if self.width > self.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    /// Native surface size in whole pixels (1 point = 1 pixel)
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSide {
    #[default]
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageSide,
    pub orientation: Orientation,
}

/// A stored certificate design as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateTemplate {
    /// Front scene, either a JSON string or an already parsed object
    pub front: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
}

impl CertificateTemplate {
    pub fn new(front: Value) -> Self {
        Self {
            front,
            ..Self::default()
        }
    }

    pub fn dimensions(&self) -> CanvasDimensions {
        CanvasDimensions::from_optional(self.canvas_width, self.canvas_height)
    }
}

/// Substituted scenes ready to be loaded onto a surface.
///
/// Created per render request and dropped once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCanvasData {
    pub front: SceneDocument,
    pub back: Option<SceneDocument>,
    pub canvas: CanvasDimensions,
    pub certificate_id: Option<String>,
}

impl ProcessedCanvasData {
    pub fn pages(&self) -> Vec<Page> {
        let orientation = self.canvas.orientation();
        let mut pages = vec![Page {
            id: PageSide::Front,
            orientation,
        }];
        if self.back.is_some() {
            pages.push(Page {
                id: PageSide::Back,
                orientation,
            });
        }
        pages
    }

    pub fn scene(&self, side: PageSide) -> Option<&SceneDocument> {
        match side {
            PageSide::Front => Some(&self.front),
            PageSide::Back => self.back.as_ref(),
        }
    }
}
