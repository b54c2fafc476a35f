//! Line breaking for text nodes, following Fabric's textbox rules.
//!
//! A textbox wraps words greedily against its width and grows to fit a
//! word that is wider than the box. With `splitByGrapheme` it breaks
//! between extended grapheme clusters instead, so combining marks and
//! emoji sequences stay whole. Plain text nodes only break on explicit
//! newlines. Heights use Fabric's 1.13 font size multiplier.

use unicode_segmentation::UnicodeSegmentation;

use crate::models::{TextNode, TextStyle};

/// Fabric's ratio between font size and the height of one text line
pub const FONT_SIZE_MULT: f64 = 1.13;

/// Average advance used when no font metrics are available, in em
const FALLBACK_ADVANCE_EM: f64 = 0.55;

/// Font selection for measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSpec<'a> {
    pub family: Option<&'a str>,
    pub size: f64,
    pub weight: u16,
    pub italic: bool,
}

impl<'a> FontSpec<'a> {
    pub fn from_style(style: &'a TextStyle) -> Self {
        Self {
            family: style.font_family.as_deref(),
            size: style.font_size(),
            weight: style.weight(),
            italic: style.is_italic(),
        }
    }
}

/// Horizontal advance of a run of text
pub trait TextMeasure: Send + Sync {
    fn measure(&self, text: &str, font: &FontSpec<'_>) -> f64;
}

/// Fixed-width estimate used before fonts are available
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateMeasure;

impl TextMeasure for ApproximateMeasure {
    fn measure(&self, text: &str, font: &FontSpec<'_>) -> f64 {
        text.chars().count() as f64 * font.size * FALLBACK_ADVANCE_EM
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<String>,
    /// Box width after growing to the widest unbreakable run
    pub width: f64,
    pub height: f64,
    pub line_height: f64,
    pub font_size: f64,
}

impl TextLayout {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Lay out a text node. `wrap` enables width-bound wrapping (textbox).
pub fn layout_text(node: &TextNode, wrap: bool, measure: &dyn TextMeasure) -> TextLayout {
    let font = FontSpec::from_style(&node.style);
    let line_height = font.size * FONT_SIZE_MULT * node.style.line_height();
    let by_grapheme = node.style.split_by_grapheme.unwrap_or(false);

    let (lines, width) = if wrap && node.geometry.width > 0.0 {
        wrap_lines(&node.text, node.geometry.width, by_grapheme, &font, measure)
    } else {
        let lines: Vec<String> = node.text.split('\n').map(str::to_string).collect();
        let width = lines
            .iter()
            .map(|line| measure.measure(line, &font))
            .fold(0.0, f64::max);
        (lines, width)
    };

    let height = if lines.is_empty() {
        0.0
    } else {
        line_height * (lines.len() - 1) as f64 + font.size * FONT_SIZE_MULT
    };

    TextLayout {
        lines,
        width,
        height,
        line_height,
        font_size: font.size,
    }
}

fn wrap_lines(
    text: &str,
    max_width: f64,
    by_grapheme: bool,
    font: &FontSpec<'_>,
    measure: &dyn TextMeasure,
) -> (Vec<String>, f64) {
    let mut lines = Vec::new();
    let mut width = max_width;

    for paragraph in text.split('\n') {
        let units: Vec<String> = if by_grapheme {
            paragraph.graphemes(true).map(str::to_string).collect()
        } else {
            paragraph.split(' ').map(str::to_string).collect()
        };
        let joiner = if by_grapheme { "" } else { " " };

        let mut line = String::new();
        for unit in units {
            let unit_width = measure.measure(&unit, font);
            width = width.max(unit_width);

            if line.is_empty() {
                line = unit;
                continue;
            }

            let candidate = format!("{line}{joiner}{unit}");
            if measure.measure(&candidate, font) > max_width {
                lines.push(std::mem::replace(&mut line, unit));
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }

    (lines, width)
}
