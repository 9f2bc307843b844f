//! Per-element rendering helpers
//!
//! The compositor drives the page loop; this module turns one text element
//! into the lines, font size and style it is drawn with.

use crate::parser::substitute_variables;
use crate::schema::{Align, EditorElement};
use crate::Variables;
use pdf_core::{BaseFont, Color, TextStyle};

/// Size used when auto-fit has nothing sensible to work with
pub const FALLBACK_FONT_SIZE: f32 = 12.0;

/// Smallest auto-fit size
pub const MIN_FONT_SIZE: f32 = 6.0;

/// Distance between stacked lines, as a multiple of the font size
pub const LINE_HEIGHT_FACTOR: f64 = 1.2;

/// Trait for elements that can provide their text content
pub trait TextContent {
    /// Content with every known `(variable)` replaced
    fn resolved_text(&self, variables: &Variables) -> String;
}

impl TextContent for EditorElement {
    fn resolved_text(&self, variables: &Variables) -> String {
        self.content
            .as_deref()
            .map(|content| substitute_variables(content, variables))
            .unwrap_or_default()
    }
}

/// Font size for a text element drawn in a `box_width` x `box_height` box (points)
///
/// An explicit positive `fontSize` wins. Otherwise the size is approximated
/// as `min(height * 0.8, width / chars * 2)` over the longest line, never
/// below [`MIN_FONT_SIZE`]; empty text or a degenerate box gives
/// [`FALLBACK_FONT_SIZE`].
pub fn font_size_for(element: &EditorElement, text: &str, box_width: f64, box_height: f64) -> f32 {
    if let Some(size) = element.font_size.filter(|s| s.is_finite() && *s > 0.0) {
        return size;
    }

    let chars = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
    if chars == 0 {
        return FALLBACK_FONT_SIZE;
    }

    let lines = text.lines().count().max(1) as f64;
    let by_height = box_height / lines * 0.8;
    let by_width = box_width / chars as f64 * 2.0;
    let size = by_height.min(by_width) as f32;

    if !size.is_finite() || size <= 0.0 {
        return FALLBACK_FONT_SIZE;
    }
    size.max(MIN_FONT_SIZE)
}

/// Drawing style for a text element
///
/// `fontFamily` is display metadata and does not influence the result.
pub fn text_style(element: &EditorElement, size: f32) -> TextStyle {
    TextStyle {
        font: BaseFont::with_flags(element.bold, element.italic),
        size,
        color: element
            .color
            .as_deref()
            .and_then(Color::from_hex)
            .unwrap_or_default(),
        align: convert_align(element.text_align),
    }
}

/// Anchor X for an aligned line inside a box starting at `x`
pub fn anchor_x(align: Align, x: f64, width: f64) -> f64 {
    match align {
        Align::Left => x,
        Align::Center => x + width / 2.0,
        Align::Right => x + width,
    }
}

/// Convert schema Align to pdf_core Align
pub fn convert_align(align: Align) -> pdf_core::Align {
    match align {
        Align::Left => pdf_core::Align::Left,
        Align::Center => pdf_core::Align::Center,
        Align::Right => pdf_core::Align::Right,
    }
}
