//! Scene documents in the Fabric-style JSON vocabulary.
//!
//! A scene is a root object holding an ordered list of nodes. Nodes are
//! classified into a closed set of variants when parsed; anything the
//! renderer does not understand is kept as [`SceneNode::Other`] and passes
//! through every transformation untouched. Fields that are not modelled
//! explicitly are preserved in each node's `extra` map, and the original
//! spelling of the `type` tag (`Textbox` vs `textbox`) is kept on output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Semantic name of the canvas-sized background node
pub const BACKGROUND_NAME: &str = "backgroundRect";

/// Fabric's default font size for text nodes
pub const DEFAULT_FONT_SIZE: f64 = 40.0;

/// Fabric's default line height multiplier for text nodes
pub const DEFAULT_LINE_HEIGHT: f64 = 1.16;

fn one() -> f64 {
    1.0
}

/// Position, size and transform shared by every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default = "one")]
    pub scale_x: f64,
    #[serde(default = "one")]
    pub scale_y: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: 0.0,
            height: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            origin_x: None,
            origin_y: None,
            opacity: None,
            visible: None,
        }
    }
}

impl Geometry {
    /// On-scene size after scaling
    pub fn footprint(&self) -> (f64, f64) {
        (self.width * self.scale_x, self.height * self.scale_y)
    }

    /// Fraction of the scaled width/height between the origin point and
    /// the left/top edge (`left` = 0, `center` = 0.5, `right` = 1).
    pub fn origin_factors(&self) -> (f64, f64) {
        fn factor(origin: Option<&str>, start: &str, end: &str) -> f64 {
            match origin {
                Some(o) if o == start => 0.0,
                Some("center") => 0.5,
                Some(o) if o == end => 1.0,
                _ => 0.0,
            }
        }
        (
            factor(self.origin_x.as_deref(), "left", "right"),
            factor(self.origin_y.as_deref(), "top", "bottom"),
        )
    }

    /// Center of the node in its parent's coordinate space, taking origin
    /// and rotation into account.
    pub fn center(&self) -> (f64, f64) {
        let (w, h) = self.footprint();
        let (fx, fy) = self.origin_factors();
        let dx = (0.5 - fx) * w;
        let dy = (0.5 - fy) * h;
        let (sin, cos) = self.angle.to_radians().sin_cos();
        (
            self.left + dx * cos - dy * sin,
            self.top + dx * sin + dy * cos,
        )
    }

    pub fn is_visible(&self) -> bool {
        self.visible.unwrap_or(true)
    }
}

/// Custom metadata that is not part of the base graphics vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_placeholder: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder_name: Option<String>,
    #[serde(
        default,
        rename = "isQRCodePlaceholder",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_qr_code_placeholder: Option<bool>,
    #[serde(default, rename = "qrCodeName", skip_serializing_if = "Option::is_none")]
    pub qr_code_name: Option<String>,
    /// Fit box for images whose true aspect ratio is only known after load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_height: Option<f64>,
}

impl NodeMeta {
    pub fn id_str(&self) -> Option<String> {
        value_as_text(self.id.as_ref())
    }

    pub fn unique_id_str(&self) -> Option<String> {
        value_as_text(self.unique_id.as_ref())
    }
}

fn value_as_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fill and stroke of shapes and placeholder slots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_dash_array: Option<Vec<f64>>,
}

/// Typography of text nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linethrough: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_by_grapheme: Option<bool>,
}

impl TextStyle {
    pub fn font_size(&self) -> f64 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn line_height(&self) -> f64 {
        self.line_height.unwrap_or(DEFAULT_LINE_HEIGHT)
    }

    /// Numeric CSS weight (`bold` = 700, `normal` = 400)
    pub fn weight(&self) -> u16 {
        match &self.font_weight {
            Some(Value::Number(n)) => n.as_u64().map(|w| w as u16).unwrap_or(400),
            Some(Value::String(s)) => match s.as_str() {
                "bold" | "bolder" => 700,
                "lighter" => 300,
                other => other.parse().unwrap_or(400),
            },
            _ => 400,
        }
    }

    pub fn is_italic(&self) -> bool {
        matches!(self.font_style.as_deref(), Some("italic" | "oblique"))
    }
}

/// `textbox` (wrapping) and `i-text`/`text` (non-wrapping) nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(flatten)]
    pub style: TextStyle,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageNode {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(default)]
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_smoothing: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageNode {
    /// Images whose scale is corrected once the bitmap's natural size is known
    pub fn is_signature(&self) -> bool {
        self.meta.name.as_deref().is_some_and(|name| {
            let name = name.to_lowercase();
            name.starts_with("assinatura") || name.starts_with("signature")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupNode {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(default)]
    pub objects: Vec<SceneNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeKind {
    #[default]
    Rect,
    Circle,
    Ellipse,
    Line,
    Triangle,
    Polygon,
    Polyline,
    Path,
}

impl ShapeKind {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "rect" => Self::Rect,
            "circle" => Self::Circle,
            "ellipse" => Self::Ellipse,
            "line" => Self::Line,
            "triangle" => Self::Triangle,
            "polygon" => Self::Polygon,
            "polyline" => Self::Polyline,
            "path" => Self::Path,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeNode {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(skip)]
    pub kind: ShapeKind,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(flatten)]
    pub paint: Paint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_offset: Option<Point>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ShapeNode {
    /// Canvas-sized rectangle used as the scene background
    pub fn background(width: f64, height: f64, fill: Option<Value>) -> Self {
        Self {
            tag: "rect".to_string(),
            kind: ShapeKind::Rect,
            geometry: Geometry {
                width,
                height,
                origin_x: Some("left".to_string()),
                origin_y: Some("top".to_string()),
                ..Geometry::default()
            },
            meta: NodeMeta {
                name: Some(BACKGROUND_NAME.to_string()),
                ..NodeMeta::default()
            },
            paint: Paint {
                fill: Some(fill.unwrap_or_else(|| Value::String("#ffffff".to_string()))),
                stroke: None,
                stroke_width: Some(0.0),
                stroke_dash_array: None,
            },
            rx: None,
            ry: None,
            radius: None,
            x1: None,
            y1: None,
            x2: None,
            y2: None,
            points: None,
            path: None,
            path_offset: None,
            extra: Map::new(),
        }
    }
}

/// Image slot waiting for a `url` variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderNode {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(flatten)]
    pub paint: Paint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<SceneNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Slot replaced by a generated QR code at load time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPlaceholderNode {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(flatten)]
    pub paint: Paint,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QrPlaceholderNode {
    /// Marker carrying the geometry of the slot it replaces
    pub fn marker(geometry: Geometry, name: &str) -> Self {
        Self {
            tag: "rect".to_string(),
            geometry,
            meta: NodeMeta {
                name: Some(name.to_string()),
                is_qr_code_placeholder: Some(true),
                qr_code_name: Some(name.to_string()),
                ..NodeMeta::default()
            },
            paint: Paint {
                fill: Some(Value::String("transparent".to_string())),
                ..Paint::default()
            },
            extra: Map::new(),
        }
    }
}

/// A node of the scene graph
#[derive(Debug, Clone, PartialEq)]
pub enum SceneNode {
    Textbox(TextNode),
    Text(TextNode),
    Image(ImageNode),
    Group(GroupNode),
    Shape(ShapeNode),
    Placeholder(PlaceholderNode),
    QrPlaceholder(QrPlaceholderNode),
    /// Unknown or malformed node, kept verbatim
    Other(Value),
}

impl SceneNode {
    /// Classify a raw JSON node.
    ///
    /// Placeholder flags win over the `type` tag. A node whose fields do
    /// not fit its variant falls back to [`SceneNode::Other`].
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = &value else {
            return SceneNode::Other(value);
        };
        let flag = |key: &str| map.get(key).and_then(Value::as_bool).unwrap_or(false);
        let tag = map
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_lowercase();

        let parsed = if flag("isQRCodePlaceholder") {
            serde_json::from_value(value.clone()).map(SceneNode::QrPlaceholder)
        } else if flag("isPlaceholder") {
            serde_json::from_value(value.clone()).map(SceneNode::Placeholder)
        } else {
            match tag.as_str() {
                "textbox" => serde_json::from_value(value.clone()).map(SceneNode::Textbox),
                "i-text" | "itext" | "text" => {
                    serde_json::from_value(value.clone()).map(SceneNode::Text)
                }
                "image" => serde_json::from_value(value.clone()).map(SceneNode::Image),
                "group" => serde_json::from_value(value.clone()).map(SceneNode::Group),
                other => match ShapeKind::from_tag(other) {
                    Some(kind) => serde_json::from_value::<ShapeNode>(value.clone())
                        .map(|shape| SceneNode::Shape(ShapeNode { kind, ..shape })),
                    None => return SceneNode::Other(value),
                },
            }
        };

        parsed.unwrap_or_else(|e| {
            tracing::debug!(tag = %tag, error = %e, "Keeping malformed node as pass-through");
            SceneNode::Other(value)
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            SceneNode::Textbox(n) | SceneNode::Text(n) => Some(&n.geometry),
            SceneNode::Image(n) => Some(&n.geometry),
            SceneNode::Group(n) => Some(&n.geometry),
            SceneNode::Shape(n) => Some(&n.geometry),
            SceneNode::Placeholder(n) => Some(&n.geometry),
            SceneNode::QrPlaceholder(n) => Some(&n.geometry),
            SceneNode::Other(_) => None,
        }
    }

    pub fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        match self {
            SceneNode::Textbox(n) | SceneNode::Text(n) => Some(&mut n.geometry),
            SceneNode::Image(n) => Some(&mut n.geometry),
            SceneNode::Group(n) => Some(&mut n.geometry),
            SceneNode::Shape(n) => Some(&mut n.geometry),
            SceneNode::Placeholder(n) => Some(&mut n.geometry),
            SceneNode::QrPlaceholder(n) => Some(&mut n.geometry),
            SceneNode::Other(_) => None,
        }
    }

    pub fn meta(&self) -> Option<&NodeMeta> {
        match self {
            SceneNode::Textbox(n) | SceneNode::Text(n) => Some(&n.meta),
            SceneNode::Image(n) => Some(&n.meta),
            SceneNode::Group(n) => Some(&n.meta),
            SceneNode::Shape(n) => Some(&n.meta),
            SceneNode::Placeholder(n) => Some(&n.meta),
            SceneNode::QrPlaceholder(n) => Some(&n.meta),
            SceneNode::Other(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.meta().and_then(|m| m.name.as_deref())
    }

    pub fn is_background(&self) -> bool {
        self.name() == Some(BACKGROUND_NAME)
    }
}

impl Serialize for SceneNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SceneNode::Textbox(n) | SceneNode::Text(n) => n.serialize(serializer),
            SceneNode::Image(n) => n.serialize(serializer),
            SceneNode::Group(n) => n.serialize(serializer),
            SceneNode::Shape(n) => n.serialize(serializer),
            SceneNode::Placeholder(n) => n.serialize(serializer),
            SceneNode::QrPlaceholder(n) => n.serialize(serializer),
            SceneNode::Other(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SceneNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(SceneNode::from_value)
    }
}

/// Root of a scene graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    #[serde(default)]
    pub objects: Vec<SceneNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SceneDocument {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
