//! Serialize a [`Surface`] to an SVG document for rasterization.
//!
//! Every node is drawn centred on its own origin and placed with
//! `translate(center) rotate(angle) scale(sx sy)`, which is how Fabric
//! positions objects. Group children are positioned relative to the
//! group's centre, so nesting `<g>` elements reproduces the hierarchy.

use serde_json::Value;

use super::surface::{Surface, SurfaceObject};
use super::text_layout::FONT_SIZE_MULT;
use crate::models::{
    Geometry, ImageNode, Paint, Point, SceneNode, ShapeKind, ShapeNode, TextNode,
};
use crate::services::image_source::Bitmap;

/// Fabric's share of the font size kept below the baseline
const FONT_SIZE_FRACTION: f64 = 0.222;

/// Fabric's fill when a node does not set one
const DEFAULT_FILL: &str = "rgb(0,0,0)";

pub fn render_svg(surface: &Surface) -> String {
    let (w, h) = (num(surface.width), num(surface.height));
    let mut out = String::with_capacity(8192);
    out.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    ));

    if let Some(color) = surface.background.as_ref().and_then(color_of) {
        out.push_str(&format!(
            r#"<rect x="0" y="0" width="{w}" height="{h}" fill="{}"/>"#,
            escape(&color)
        ));
    }

    for object in &surface.objects {
        render_object(&mut out, object);
    }

    out.push_str("</svg>");
    out
}

fn render_object(out: &mut String, object: &SurfaceObject) {
    let Some(geometry) = object.node.geometry() else {
        return;
    };
    if !geometry.is_visible() {
        return;
    }

    let mut attrs = format!(r#" transform="{}""#, transform(geometry));
    if let Some(opacity) = geometry.opacity.filter(|o| *o < 1.0) {
        attrs.push_str(&format!(r#" opacity="{}""#, num(opacity.max(0.0))));
    }

    match &object.node {
        SceneNode::Shape(shape) => render_shape(out, shape, &attrs),
        SceneNode::Textbox(text) | SceneNode::Text(text) => render_text(out, object, text, &attrs),
        SceneNode::Image(image) => render_image(out, image, object.bitmap.as_ref(), &attrs),
        SceneNode::Group(_) => render_children(out, object, &attrs),
        SceneNode::Placeholder(placeholder) => {
            if object.children.is_empty() {
                let (hw, hh) = (geometry.width / 2.0, geometry.height / 2.0);
                out.push_str(&format!(
                    r#"<rect{attrs} x="{}" y="{}" width="{}" height="{}" fill="{}"{}/>"#,
                    num(-hw),
                    num(-hh),
                    num(geometry.width),
                    num(geometry.height),
                    fill(&placeholder.paint, "none"),
                    stroke(&placeholder.paint)
                ));
            } else {
                render_children(out, object, &attrs);
            }
        }
        // Unreplaced QR slots are invisible markers
        SceneNode::QrPlaceholder(_) | SceneNode::Other(_) => {}
    }
}

fn render_children(out: &mut String, object: &SurfaceObject, attrs: &str) {
    out.push_str(&format!("<g{attrs}>"));
    for child in &object.children {
        render_object(out, child);
    }
    out.push_str("</g>");
}

fn transform(geometry: &Geometry) -> String {
    let (cx, cy) = geometry.center();
    format!(
        "translate({} {}) rotate({}) scale({} {})",
        num(cx),
        num(cy),
        num(geometry.angle),
        num(geometry.scale_x),
        num(geometry.scale_y)
    )
}

fn render_shape(out: &mut String, shape: &ShapeNode, attrs: &str) {
    let g = &shape.geometry;
    let (hw, hh) = (g.width / 2.0, g.height / 2.0);
    let paint = format!(
        r#" fill="{}"{}"#,
        fill(&shape.paint, DEFAULT_FILL),
        stroke(&shape.paint)
    );

    let element = match shape.kind {
        ShapeKind::Rect => {
            let mut corners = String::new();
            if let Some(rx) = shape.rx.filter(|r| *r > 0.0) {
                corners.push_str(&format!(r#" rx="{}""#, num(rx)));
            }
            if let Some(ry) = shape.ry.filter(|r| *r > 0.0) {
                corners.push_str(&format!(r#" ry="{}""#, num(ry)));
            }
            format!(
                r#"<rect x="{}" y="{}" width="{}" height="{}"{corners}"#,
                num(-hw),
                num(-hh),
                num(g.width),
                num(g.height)
            )
        }
        ShapeKind::Circle => format!(r#"<circle cx="0" cy="0" r="{}""#, num(shape.radius.unwrap_or(hw))),
        ShapeKind::Ellipse => format!(
            r#"<ellipse cx="0" cy="0" rx="{}" ry="{}""#,
            num(shape.rx.unwrap_or(hw)),
            num(shape.ry.unwrap_or(hh))
        ),
        ShapeKind::Line => {
            let (x1, y1) = (shape.x1.unwrap_or(0.0), shape.y1.unwrap_or(0.0));
            let (x2, y2) = (shape.x2.unwrap_or(0.0), shape.y2.unwrap_or(0.0));
            let (min_x, min_y) = (x1.min(x2), y1.min(y2));
            format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}""#,
                num(x1 - min_x - hw),
                num(y1 - min_y - hh),
                num(x2 - min_x - hw),
                num(y2 - min_y - hh)
            )
        }
        ShapeKind::Triangle => format!(
            r#"<polygon points="{},{} {},{} {},{}""#,
            num(-hw),
            num(hh),
            num(0.0),
            num(-hh),
            num(hw),
            num(hh)
        ),
        ShapeKind::Polygon | ShapeKind::Polyline => {
            let points = shape.points.as_deref().unwrap_or_default();
            let offset = shape.path_offset.unwrap_or_else(|| bbox_center(points));
            let list: Vec<String> = points
                .iter()
                .map(|p| format!("{},{}", num(p.x - offset.x), num(p.y - offset.y)))
                .collect();
            let tag = if shape.kind == ShapeKind::Polygon {
                "polygon"
            } else {
                "polyline"
            };
            format!(r#"<{tag} points="{}""#, list.join(" "))
        }
        ShapeKind::Path => {
            let offset = shape.path_offset.unwrap_or(Point { x: hw, y: hh });
            format!(
                r#"<path d="{}" transform="translate({} {})""#,
                escape(&path_data(shape.path.as_deref().unwrap_or_default())),
                num(-offset.x),
                num(-offset.y)
            )
        }
    };

    // Paths carry their own offset transform, so wrap them
    if shape.kind == ShapeKind::Path {
        out.push_str(&format!("<g{attrs}>{element}{paint}/></g>"));
    } else {
        out.push_str(&format!("{element}{attrs}{paint}/>"));
    }
}

fn bbox_center(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point { x: 0.0, y: 0.0 };
    }
    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Point {
        x: (min_x + max_x) / 2.0,
        y: (min_y + max_y) / 2.0,
    }
}

/// `[["M", 0, 0], ["L", 10, 10]]` → `M 0 0 L 10 10`
fn path_data(commands: &[Value]) -> String {
    let mut parts = Vec::new();
    for command in commands {
        match command {
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => parts.push(s.clone()),
                        Value::Number(n) => parts.push(num(n.as_f64().unwrap_or(0.0))),
                        _ => {}
                    }
                }
            }
            Value::String(s) => parts.push(s.clone()),
            _ => {}
        }
    }
    parts.join(" ")
}

fn render_text(out: &mut String, object: &SurfaceObject, text: &TextNode, attrs: &str) {
    let g = &text.geometry;
    let style = &text.style;

    let (lines, line_height, font_size) = match &object.layout {
        Some(layout) => (layout.lines.clone(), layout.line_height, layout.font_size),
        None => {
            let size = style.font_size();
            (
                text.text.split('\n').map(str::to_string).collect(),
                size * FONT_SIZE_MULT * style.line_height(),
                size,
            )
        }
    };

    let (anchor, x) = match style.text_align.as_deref() {
        Some("center") => ("middle", 0.0),
        Some("right") => ("end", g.width / 2.0),
        _ => ("start", -g.width / 2.0),
    };

    let mut font = String::new();
    if let Some(family) = style.font_family.as_deref() {
        font.push_str(&format!(r#" font-family="{}""#, escape(family)));
    }
    font.push_str(&format!(
        r#" font-size="{}" font-weight="{}""#,
        num(font_size),
        style.weight()
    ));
    if style.is_italic() {
        font.push_str(r#" font-style="italic""#);
    }
    let decoration = match (style.underline, style.linethrough) {
        (Some(true), Some(true)) => Some("underline line-through"),
        (Some(true), _) => Some("underline"),
        (_, Some(true)) => Some("line-through"),
        _ => None,
    };
    if let Some(decoration) = decoration {
        font.push_str(&format!(r#" text-decoration="{decoration}""#));
    }

    let fill = color_or(style.fill.as_ref(), DEFAULT_FILL);
    out.push_str(&format!(
        r#"<text{attrs}{font} fill="{fill}" text-anchor="{anchor}" xml:space="preserve">"#
    ));

    let top = -g.height / 2.0;
    let baseline = font_size * FONT_SIZE_MULT * (1.0 - FONT_SIZE_FRACTION);
    for (i, line) in lines.iter().enumerate() {
        let y = top + line_height * i as f64 + baseline;
        out.push_str(&format!(
            r#"<tspan x="{}" y="{}">{}</tspan>"#,
            num(x),
            num(y),
            escape(line)
        ));
    }
    out.push_str("</text>");
}

fn render_image(out: &mut String, image: &ImageNode, bitmap: Option<&Bitmap>, attrs: &str) {
    let Some(bitmap) = bitmap else {
        return;
    };
    let g = &image.geometry;
    let width = if g.width > 0.0 { g.width } else { bitmap.width as f64 };
    let height = if g.height > 0.0 { g.height } else { bitmap.height as f64 };
    let rendering = if image.image_smoothing == Some(false) {
        r#" image-rendering="optimizeSpeed""#
    } else {
        ""
    };

    out.push_str(&format!(
        r#"<image{attrs} x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="none"{rendering} xlink:href="{}"/>"#,
        num(-width / 2.0),
        num(-height / 2.0),
        num(width),
        num(height),
        bitmap.data_uri()
    ));
}

fn fill(paint: &Paint, default: &str) -> String {
    color_or(paint.fill.as_ref(), default)
}

fn stroke(paint: &Paint) -> String {
    let Some(color) = paint.stroke.as_ref().and_then(color_of) else {
        return String::new();
    };
    let width = paint.stroke_width.unwrap_or(1.0);
    if width <= 0.0 {
        return String::new();
    }
    let mut attrs = format!(
        r#" stroke="{}" stroke-width="{}""#,
        escape(&color),
        num(width)
    );
    if let Some(dashes) = paint.stroke_dash_array.as_ref().filter(|d| !d.is_empty()) {
        let list: Vec<String> = dashes.iter().map(|d| num(*d)).collect();
        attrs.push_str(&format!(r#" stroke-dasharray="{}""#, list.join(" ")));
    }
    attrs
}

fn color_or(value: Option<&Value>, default: &str) -> String {
    match value {
        None => default.to_string(),
        Some(v) => escape(&color_of(v).unwrap_or_else(|| "none".to_string())),
    }
}

/// A plain colour, or the first stop of a gradient. `None` means unpainted.
fn color_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("transparent") {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Object(gradient) => gradient
            .get("colorStops")
            .and_then(Value::as_array)
            .and_then(|stops| stops.first())
            .and_then(|stop| stop.get("color"))
            .and_then(color_of),
        _ => None,
    }
}

fn num(value: f64) -> String {
    if value.is_finite() {
        let rounded = (value * 1000.0).round() / 1000.0;
        format!("{}", rounded + 0.0)
    } else {
        "0".to_string()
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
