//! Template composition: draw substituted text and resolved images onto the
//! template PDF

use crate::elements::{anchor_x, font_size_for, text_style, TextContent, LINE_HEIGHT_FACTOR};
use crate::mapper::{map_rect, MappedRect, RelativeRect};
use crate::schema::*;
use crate::{Result, TemplateError};
use pdf_core::PdfDocument;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// Image bytes per variable name, or the reason they could not be obtained
pub type ImageAssets = HashMap<String, std::result::Result<Vec<u8>, String>>;

/// An element that could not be drawn
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFailure {
    pub element_id: Option<String>,
    /// Page index (0-based)
    pub page: usize,
    pub kind: ElementKind,
    /// Image variable involved, if any
    pub variable: Option<String>,
    pub message: String,
}

impl fmt::Display for ElementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variable {
            Some(variable) => write!(f, "{} (page {}): {}", variable, self.page, self.message),
            None => write!(f, "{:?} element (page {}): {}", self.kind, self.page, self.message),
        }
    }
}

/// Outcome of drawing every element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionReport {
    pub rendered: usize,
    pub failures: Vec<ElementFailure>,
}

impl CompositionReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// No element failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// One line per failure
    pub fn error_messages(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }
}

/// Final PDF bytes together with the report
#[derive(Debug, Clone)]
pub struct Composition {
    pub pdf: Vec<u8>,
    pub report: CompositionReport,
}

/// Draws a template's editor elements onto its PDF
pub struct TemplateRenderer<'a> {
    /// Elements to draw
    elements: &'a [EditorElement],
    /// Size the element percentages refer to
    page_dimensions: Option<PageDimensions>,
}

impl<'a> TemplateRenderer<'a> {
    /// Create a new renderer for a set of elements
    pub fn new(elements: &'a [EditorElement]) -> Self {
        Self {
            elements,
            page_dimensions: None,
        }
    }

    /// Use the dimensions recorded at upload time instead of each page's own size
    pub fn with_page_dimensions(mut self, dimensions: Option<PageDimensions>) -> Self {
        self.page_dimensions = dimensions.filter(PageDimensions::is_usable);
        self
    }

    /// Draw every element into `doc`
    ///
    /// A failing element is recorded and skipped; it never stops the others.
    pub fn render(
        &self,
        doc: &mut PdfDocument,
        variables: &Variables,
        images: &ImageAssets,
    ) -> CompositionReport {
        let mut report = CompositionReport::default();

        for (page, elements) in self.elements_by_page() {
            for element in elements {
                match self.render_element(doc, page, element, variables, images) {
                    Ok(()) => report.rendered += 1,
                    Err(e) => {
                        let failure = ElementFailure {
                            element_id: element.id.clone(),
                            page,
                            kind: element.kind,
                            variable: element.variable_name.clone().filter(|_| element.is_image()),
                            message: e.to_string(),
                        };
                        warn!(page, element = ?element.id, error = %failure.message, "element skipped");
                        report.failures.push(failure);
                    }
                }
            }
        }

        debug!(
            rendered = report.rendered,
            failed = report.failed(),
            "composition finished"
        );
        report
    }

    /// Elements grouped by page index, pages in ascending order
    fn elements_by_page(&self) -> BTreeMap<usize, Vec<&'a EditorElement>> {
        let mut pages: BTreeMap<usize, Vec<&EditorElement>> = BTreeMap::new();
        for element in self.elements {
            pages.entry(element.page).or_default().push(element);
        }
        pages
    }

    fn render_element(
        &self,
        doc: &mut PdfDocument,
        page: usize,
        element: &EditorElement,
        variables: &Variables,
        images: &ImageAssets,
    ) -> Result<()> {
        let pdf_page = page + 1;
        let dimensions = match self.page_dimensions {
            Some(d) => d,
            None => doc.page_size(pdf_page)?.into(),
        };
        let rect = map_rect(&RelativeRect::from(element), &dimensions);

        match element.kind {
            ElementKind::Text => self.render_text_element(doc, pdf_page, element, &rect, variables),
            ElementKind::Image => self.render_image_element(doc, pdf_page, element, &rect, images),
        }
    }

    /// Render a text element, one PDF line per `\n`
    fn render_text_element(
        &self,
        doc: &mut PdfDocument,
        pdf_page: usize,
        element: &EditorElement,
        rect: &MappedRect,
        variables: &Variables,
    ) -> Result<()> {
        let text = element.resolved_text(variables);
        if text.trim().is_empty() {
            return Ok(());
        }

        let size = font_size_for(element, &text, rect.width, rect.height);
        let style = text_style(element, size);
        let x = anchor_x(element.text_align, rect.x, rect.width);
        let line_height = size as f64 * LINE_HEIGHT_FACTOR;

        // Reject the whole element before any of its lines is drawn
        for line in text.lines() {
            pdf_core::encode_win_ansi(line)?;
        }

        let mut y = rect.text_baseline(size as f64);
        for line in text.lines() {
            doc.insert_text(line, pdf_page, x, y, &style)?;
            y -= line_height;
        }

        Ok(())
    }

    /// Render an image element stretched to its box
    fn render_image_element(
        &self,
        doc: &mut PdfDocument,
        pdf_page: usize,
        element: &EditorElement,
        rect: &MappedRect,
        images: &ImageAssets,
    ) -> Result<()> {
        let variable = element
            .variable_name
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TemplateError::ImageError("image element has no variableName".into()))?;

        let data = match images.get(variable) {
            Some(Ok(data)) => data,
            Some(Err(reason)) => return Err(TemplateError::ImageError(reason.clone())),
            None => {
                return Err(TemplateError::ImageError(format!(
                    "no image supplied for variable '{variable}'"
                )))
            }
        };

        doc.insert_image(data, pdf_page, rect.x, rect.bottom(), rect.width, rect.height)?;
        Ok(())
    }
}

/// Compose a template PDF with its elements
///
/// Fails only when the template PDF itself cannot be read or written;
/// element-level problems are listed in the returned report.
pub fn compose(
    template_pdf: &[u8],
    elements: &[EditorElement],
    variables: &Variables,
    page_dimensions: Option<PageDimensions>,
    images: &ImageAssets,
) -> Result<Composition> {
    let mut doc = PdfDocument::open_from_bytes(template_pdf)?;

    let report = TemplateRenderer::new(elements)
        .with_page_dimensions(page_dimensions)
        .render(&mut doc, variables, images);

    let pdf = doc.to_bytes()?;
    Ok(Composition { pdf, report })
}
