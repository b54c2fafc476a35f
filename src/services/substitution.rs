//! Template variable substitution over scene documents.
//!
//! The walk is pure: the input is never mutated and a fresh document is
//! returned. Text nodes get `{{key}}` interpolation, image placeholder
//! slots become image nodes (or QR markers), and groups are rebuilt from
//! their substituted children. Unknown `{{key}}` markup is left in place
//! so a missing variable stays visible on the rendered certificate.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::models::{
    Geometry, GroupNode, ImageNode, NodeMeta, PlaceholderNode, QrPlaceholderNode, SceneDocument,
    SceneNode, TextNode, VariableMap,
};

/// Assumed natural size of an image that has not been fetched yet.
/// The scene loader corrects the scale once the real size is known.
pub const ESTIMATED_IMAGE_WIDTH: f64 = 800.0;
pub const ESTIMATED_IMAGE_HEIGHT: f64 = 400.0;

/// Share of the placeholder bounds left free around a substituted image
pub const FIT_MARGIN: f64 = 0.10;

/// Prefix of placeholder ids that embed the slot name
const PLACEHOLDER_ID_PREFIX: &str = "placeholder_";

/// Marker shown on the label of image slots in the editor
const CAMERA_MARKER: &str = "📷";

#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error("Invalid scene JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A scene as handed over by the caller
#[derive(Debug, Clone, Copy)]
pub enum SceneInput<'a> {
    /// Serialized JSON text
    Json(&'a str),
    /// Already parsed value (a JSON string value is parsed again)
    Value(&'a Value),
}

impl<'a> From<&'a str> for SceneInput<'a> {
    fn from(json: &'a str) -> Self {
        SceneInput::Json(json)
    }
}

impl<'a> From<&'a Value> for SceneInput<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::String(json) => SceneInput::Json(json),
            other => SceneInput::Value(other),
        }
    }
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("valid variable pattern"))
}

/// Best-effort substitution.
///
/// Always returns a parsed value. With an empty variable map the parsed
/// input is returned as is. Malformed JSON text comes back unchanged as a
/// JSON string, and a value that is not a scene document is returned
/// untouched.
pub fn substitute<'a>(input: impl Into<SceneInput<'a>>, variables: &VariableMap) -> Value {
    let parsed = match input.into() {
        SceneInput::Json(json) => match serde_json::from_str::<Value>(json) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Scene JSON is malformed, returning input unchanged");
                return Value::String(json.to_string());
            }
        },
        SceneInput::Value(value) => value.clone(),
    };

    if variables.is_empty() {
        return parsed;
    }

    if let Err(e) = SceneDocument::from_value(parsed.clone()) {
        tracing::warn!(error = %e, "Value is not a scene document, returning input unchanged");
        return parsed;
    }

    let mut output = parsed;
    if let Some(Value::Array(objects)) = output.get_mut("objects") {
        substitute_raw_nodes(objects, variables);
    }
    output
}

/// Substitute in place over raw JSON nodes. Nodes that do not change keep
/// their original fields and number formatting; text nodes only get their
/// `text` and `dirty` fields rewritten.
fn substitute_raw_nodes(nodes: &mut [Value], variables: &VariableMap) {
    for raw in nodes {
        match SceneNode::from_value(raw.clone()) {
            SceneNode::Textbox(text) | SceneNode::Text(text) => {
                let interpolated = interpolate(&text.text, variables);
                if interpolated != text.text {
                    if let Value::Object(map) = raw {
                        map.insert("text".to_string(), Value::String(interpolated));
                        map.insert("dirty".to_string(), Value::Bool(true));
                    }
                }
            }
            SceneNode::Group(_) => {
                if let Some(Value::Array(children)) = raw.get_mut("objects") {
                    substitute_raw_nodes(children, variables);
                }
            }
            SceneNode::Placeholder(placeholder) => {
                let resolved = resolve_placeholder(&placeholder, variables);
                if !matches!(resolved, SceneNode::Placeholder(_)) {
                    *raw = resolved.to_value();
                }
            }
            SceneNode::Image(_)
            | SceneNode::Shape(_)
            | SceneNode::QrPlaceholder(_)
            | SceneNode::Other(_) => {}
        }
    }
}

/// Parse a scene, failing on malformed input
pub fn parse_scene<'a>(input: impl Into<SceneInput<'a>>) -> Result<SceneDocument, SubstitutionError> {
    match input.into() {
        SceneInput::Json(json) => Ok(SceneDocument::parse(json)?),
        SceneInput::Value(value) => Ok(SceneDocument::from_value(value.clone())?),
    }
}

/// Strict variant of [`substitute`] returning the typed document
pub fn try_substitute<'a>(
    input: impl Into<SceneInput<'a>>,
    variables: &VariableMap,
) -> Result<SceneDocument, SubstitutionError> {
    let document = parse_scene(input)?;
    Ok(substitute_document(&document, variables))
}

pub fn substitute_document(document: &SceneDocument, variables: &VariableMap) -> SceneDocument {
    SceneDocument {
        version: document.version.clone(),
        objects: document
            .objects
            .iter()
            .map(|node| substitute_node(node, variables))
            .collect(),
        background: document.background.clone(),
        extra: document.extra.clone(),
    }
}

fn substitute_node(node: &SceneNode, variables: &VariableMap) -> SceneNode {
    match node {
        SceneNode::Textbox(text) => SceneNode::Textbox(substitute_text(text, variables)),
        SceneNode::Text(text) => SceneNode::Text(substitute_text(text, variables)),
        SceneNode::Placeholder(placeholder) => resolve_placeholder(placeholder, variables),
        SceneNode::Group(group) => SceneNode::Group(GroupNode {
            objects: group
                .objects
                .iter()
                .map(|child| substitute_node(child, variables))
                .collect(),
            ..group.clone()
        }),
        SceneNode::Image(_)
        | SceneNode::Shape(_)
        | SceneNode::QrPlaceholder(_)
        | SceneNode::Other(_) => node.clone(),
    }
}

/// Replace every `{{key}}` whose trimmed key is known; keep the rest verbatim
pub fn interpolate(text: &str, variables: &VariableMap) -> String {
    variable_pattern()
        .replace_all(text, |caps: &Captures<'_>| match variables.get(caps[1].trim()) {
            Some(variable) => variable.value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn substitute_text(node: &TextNode, variables: &VariableMap) -> TextNode {
    let text = interpolate(&node.text, variables);
    if text == node.text {
        return node.clone();
    }
    // Width and wrap hints stay as they are; the loader re-flows dirty text.
    TextNode {
        text,
        dirty: Some(true),
        ..node.clone()
    }
}

fn resolve_placeholder(placeholder: &PlaceholderNode, variables: &VariableMap) -> SceneNode {
    let Some(name) = resolve_placeholder_name(placeholder) else {
        tracing::debug!("Placeholder without a resolvable name left unresolved");
        return SceneNode::Placeholder(placeholder.clone());
    };

    if is_qr_code_name(&name) {
        return SceneNode::QrPlaceholder(QrPlaceholderNode::marker(
            placeholder.geometry.clone(),
            &name,
        ));
    }

    match variables.url(&name) {
        Some(url) => SceneNode::Image(image_for_placeholder(placeholder, &name, url)),
        None => {
            tracing::debug!(placeholder = %name, "No url variable for placeholder");
            SceneNode::Placeholder(placeholder.clone())
        }
    }
}

/// Resolve the variable name of an image slot.
///
/// Tried in order: the explicit `placeholderName`, an id of the form
/// `placeholder_<name>_<suffix>`, the label of a child text node
/// (`📷 <name>` or bare `<name>`), and finally the `uniqueId` field.
pub fn resolve_placeholder_name(placeholder: &PlaceholderNode) -> Option<String> {
    non_blank(placeholder.meta.placeholder_name.as_deref())
        .or_else(|| {
            placeholder
                .meta
                .id_str()
                .and_then(|id| name_from_placeholder_id(&id))
        })
        .or_else(|| name_from_label(&placeholder.objects))
        .or_else(|| {
            placeholder.meta.unique_id_str().and_then(|uid| {
                name_from_placeholder_id(&uid).or_else(|| non_blank(Some(uid.as_str())))
            })
        })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `placeholder_assinatura_diretor_1712` → `assinatura_diretor`.
///
/// The trailing segment is only dropped when it looks generated (contains
/// a digit), so `placeholder_assinatura_diretor` keeps its full name.
fn name_from_placeholder_id(id: &str) -> Option<String> {
    let rest = id.trim().strip_prefix(PLACEHOLDER_ID_PREFIX)?;
    let name = match rest.rsplit_once('_') {
        Some((name, suffix))
            if !name.is_empty()
                && (suffix.is_empty() || suffix.chars().any(|c| c.is_ascii_digit())) =>
        {
            name
        }
        _ => rest,
    };
    non_blank(Some(name))
}

fn name_from_label(children: &[SceneNode]) -> Option<String> {
    children.iter().find_map(|child| match child {
        SceneNode::Textbox(text) | SceneNode::Text(text) => {
            let label = text.text.trim();
            let label = label.strip_prefix(CAMERA_MARKER).unwrap_or(label);
            non_blank(Some(label))
        }
        SceneNode::Group(group) => name_from_label(&group.objects),
        _ => None,
    })
}

/// True for names like `QR Code`, `qrcode`, `QrCode ` or `qrcode_validacao`
pub fn is_qr_code_name(name: &str) -> bool {
    let normalized: String = name
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    normalized.contains("qrcode")
}

fn image_for_placeholder(placeholder: &PlaceholderNode, name: &str, url: &str) -> ImageNode {
    let (width, height) = placeholder.geometry.footprint();
    let (center_x, center_y) = placeholder.geometry.center();
    let box_width = width * (1.0 - FIT_MARGIN);
    let box_height = height * (1.0 - FIT_MARGIN);
    let scale = (box_width / ESTIMATED_IMAGE_WIDTH).min(box_height / ESTIMATED_IMAGE_HEIGHT);

    ImageNode {
        tag: "image".to_string(),
        geometry: Geometry {
            left: center_x,
            top: center_y,
            width: ESTIMATED_IMAGE_WIDTH,
            height: ESTIMATED_IMAGE_HEIGHT,
            scale_x: scale,
            scale_y: scale,
            angle: placeholder.geometry.angle,
            origin_x: Some("center".to_string()),
            origin_y: Some("center".to_string()),
            opacity: placeholder.geometry.opacity,
            visible: None,
        },
        meta: NodeMeta {
            name: Some(name.to_string()),
            placeholder_name: Some(name.to_string()),
            target_width: Some(box_width),
            target_height: Some(box_height),
            ..NodeMeta::default()
        },
        src: url.to_string(),
        image_smoothing: None,
        extra: Map::new(),
    }
}

/// Variable names a scene refers to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneVariables {
    /// Keys of `{{key}}` markup in text nodes
    pub text: BTreeSet<String>,
    /// Resolved names of image slots (QR slots excluded)
    pub placeholders: BTreeSet<String>,
}

impl SceneVariables {
    pub fn all(&self) -> BTreeSet<String> {
        self.text.union(&self.placeholders).cloned().collect()
    }
}

pub fn extract_variables(document: &SceneDocument) -> SceneVariables {
    let mut found = SceneVariables::default();
    collect_variables(&document.objects, &mut found);
    found
}

fn collect_variables(nodes: &[SceneNode], found: &mut SceneVariables) {
    for node in nodes {
        match node {
            SceneNode::Textbox(text) | SceneNode::Text(text) => {
                for caps in variable_pattern().captures_iter(&text.text) {
                    let key = caps[1].trim();
                    if !key.is_empty() {
                        found.text.insert(key.to_string());
                    }
                }
            }
            SceneNode::Placeholder(placeholder) => {
                if let Some(name) = resolve_placeholder_name(placeholder) {
                    if !is_qr_code_name(&name) {
                        found.placeholders.insert(name);
                    }
                }
            }
            SceneNode::Group(group) => collect_variables(&group.objects, found),
            SceneNode::Image(_)
            | SceneNode::Shape(_)
            | SceneNode::QrPlaceholder(_)
            | SceneNode::Other(_) => {}
        }
    }
}

/// Referenced names that are absent from `variables` or blank
pub fn missing_variables(document: &SceneDocument, variables: &VariableMap) -> Vec<String> {
    extract_variables(document)
        .all()
        .into_iter()
        .filter(|key| !matches!(variables.get(key), Some(v) if !v.is_blank()))
        .collect()
}

/// Advisory report; rendering proceeds regardless
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ValidationReport {
    pub referenced: Vec<String>,
    pub missing: Vec<String>,
}

impl ValidationReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn validate_variables(document: &SceneDocument, variables: &VariableMap) -> ValidationReport {
    let referenced: Vec<String> = extract_variables(document).all().into_iter().collect();
    let missing = missing_variables(document, variables);
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "Certificate references variables without a value");
    }
    ValidationReport {
        referenced,
        missing,
    }
}
