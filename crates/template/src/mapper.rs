//! Percentage layout to PDF point coordinates
//!
//! Editor boxes are percentages of the page with a top-left origin; PDF
//! pages use points with a bottom-left origin. Values are not clamped:
//! anything outside 0-100 simply draws off the page.

use crate::{EditorElement, PageDimensions};
use serde::{Deserialize, Serialize};

/// Box in page percentages (0-100), origin top-left
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RelativeRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RelativeRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// All four values lie in [0, 100]
    pub fn is_relative(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| (0.0..=100.0).contains(v))
    }
}

impl From<&EditorElement> for RelativeRect {
    fn from(element: &EditorElement) -> Self {
        Self::new(element.x, element.y, element.width, element.height)
    }
}

/// Box in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedRect {
    /// Left edge
    pub x: f64,
    /// Top edge, measured from the bottom of the page
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl MappedRect {
    /// Baseline of the first text line for a given font size
    pub fn text_baseline(&self, font_size: f64) -> f64 {
        self.top - font_size
    }

    /// Bottom edge, where an image is anchored
    pub fn bottom(&self) -> f64 {
        self.top - self.height
    }
}

/// Map a percentage box onto a page
pub fn map_rect(rect: &RelativeRect, page: &PageDimensions) -> MappedRect {
    MappedRect {
        x: rect.x / 100.0 * page.width,
        top: page.height - rect.y / 100.0 * page.height,
        width: rect.width / 100.0 * page.width,
        height: rect.height / 100.0 * page.height,
    }
}

/// Inverse of [`map_rect`]
///
/// Returns `None` when the page has no usable size.
pub fn to_relative(rect: &MappedRect, page: &PageDimensions) -> Option<RelativeRect> {
    if !page.is_usable() {
        return None;
    }
    Some(RelativeRect {
        x: rect.x / page.width * 100.0,
        y: (page.height - rect.top) / page.height * 100.0,
        width: rect.width / page.width * 100.0,
        height: rect.height / page.height * 100.0,
    })
}
