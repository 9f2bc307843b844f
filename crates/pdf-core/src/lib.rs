//! PDF Core - Low-level PDF overlay
//!
//! This crate provides functionality for:
//! - Opening PDF documents from bytes and serializing them back
//! - Reading page geometry (inherited MediaBox/CropBox)
//! - Drawing text with the standard Helvetica family
//! - Inserting images (JPEG, PNG; GIF and WebP are converted to PNG)
//!
//! # Example
//!
//! ```ignore
//! use pdf_core::{PdfDocument, TextStyle};
//!
//! let mut doc = PdfDocument::open_from_bytes(&std::fs::read("template.pdf")?)?;
//! doc.insert_text("Hello, World!", 1, 100.0, 700.0, &TextStyle::default())?;
//! let bytes = doc.to_bytes()?;
//! ```

mod document;
mod font;
mod image;
mod text;

pub use document::{Color, PageSize, PdfDocument, TextStyle};
pub use font::{encode_win_ansi, BaseFont, FontStyle, FontWeight};
pub use image::{detect_format, to_embeddable, ImageFormat, ImageXObject, PNG_SIGNATURE};
pub use text::pdf_literal_string;

use thiserror::Error;

/// Errors that can occur during PDF operations
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Failed to open PDF: {0}")]
    OpenError(String),

    #[error("Failed to save PDF: {0}")]
    SaveError(String),

    #[error("Invalid page number: {0} (document has {1} pages)")]
    InvalidPage(usize, usize),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Character {0:?} cannot be drawn with the standard fonts")]
    UnsupportedCharacter(char),

    #[error("PDF parsing error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Lopdf error: {0}")]
    LopdfError(#[from] lopdf::Error),
}

/// Result type for PDF operations
pub type Result<T> = std::result::Result<T, PdfError>;

/// Text alignment options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Page count and first-page size of a template PDF
///
/// Captured once when a template is uploaded; editor coordinates are
/// percentages of this size.
pub fn inspect_pdf(data: &[u8]) -> Result<(usize, PageSize)> {
    let doc = PdfDocument::open_from_bytes(data)?;
    let page_count = doc.page_count();
    if page_count == 0 {
        return Err(PdfError::ParseError("PDF has no pages".to_string()));
    }
    Ok((page_count, doc.page_size(1)?))
}
