//! Storybook templates - model, variables and composition
//!
//! This crate provides:
//! - Template, editor element and story model types
//! - `(variable)` detection and substitution
//! - Percentage to PDF point coordinate mapping
//! - Composition of text and images onto the template PDF
//!
//! # Example
//!
//! ```ignore
//! use template::{compose, parse_template};
//!
//! let document = parse_template(template_json)?;
//! let pdf = std::fs::read(&document.template.pdf_path)?;
//! let composition = compose(
//!     &pdf,
//!     &document.elements,
//!     &variables,
//!     document.template.page_dimensions,
//!     &images,
//! )?;
//! ```

pub mod elements;
pub mod mapper;
pub mod parser;
mod renderer;
mod schema;

pub use mapper::{map_rect, to_relative, MappedRect, RelativeRect};
pub use parser::{
    detect_variables, parse_template, parse_variables_from_elements, substitute_variables,
};
pub use renderer::{
    compose, Composition, CompositionReport, ElementFailure, ImageAssets, TemplateRenderer,
};
pub use schema::*;

use thiserror::Error;

/// Errors that can occur during template processing
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to parse template: {0}")]
    ParseError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("PDF error: {0}")]
    PdfError(#[from] pdf_core::PdfError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

/// Result type for template operations
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Page count and page-1 dimensions of an uploaded template PDF
pub fn inspect_template_pdf(data: &[u8]) -> Result<(usize, PageDimensions)> {
    let (pages, size) = pdf_core::inspect_pdf(data)?;
    Ok((pages, size.into()))
}
