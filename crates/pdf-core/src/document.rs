//! PDF Document wrapper

use crate::font::{encode_win_ansi, BaseFont};
use crate::image::{generate_image_operators, ImageXObject};
use crate::text::{generate_text_operators, pdf_literal_string, TextRenderContext};
use crate::{Align, PdfError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

/// A4 portrait, used when a page carries no usable MediaBox
const A4_WIDTH: f64 = 595.28;
const A4_HEIGHT: f64 = 841.89;

/// Prefix for resource names we add, so they never collide with the
/// template's own `/F1`, `/Im1`, ...
const RESOURCE_PREFIX: &str = "Sf";

/// RGB Color (values 0.0 - 1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    /// Create a new RGB color (values 0.0 - 1.0)
    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Create color from RGB values (0-255)
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Parse `#RRGGBB` or `#RGB`
    ///
    /// Returns `None` for anything else.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#')?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            6 => Some(Self::from_rgb(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                let short = |i: usize| channel(&digits[i..i + 1]).map(|v| v * 17);
                Some(Self::from_rgb(short(0)?, short(1)?, short(2)?))
            }
            _ => None,
        }
    }

    /// Black color
    pub fn black() -> Self {
        Self::rgb(0.0, 0.0, 0.0)
    }

    /// White color
    pub fn white() -> Self {
        Self::rgb(1.0, 1.0, 1.0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

/// Page size in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// How a run of text is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font: BaseFont,
    pub size: f32,
    pub color: Color,
    pub align: Align,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: BaseFont::regular(),
            size: 12.0,
            color: Color::black(),
            align: Align::Left,
        }
    }
}

/// PDF Document wrapper providing overlay operations
///
/// All drawing is buffered per page and written once in [`PdfDocument::to_bytes`]
/// or [`PdfDocument::save`]; pages that receive nothing are left untouched.
pub struct PdfDocument {
    /// The underlying lopdf document
    inner: Document,
    /// Standard fonts added as objects (variant -> object ID)
    embedded_fonts: HashMap<BaseFont, ObjectId>,
    /// Page font resources (page number -> variant -> resource name)
    page_font_resources: HashMap<usize, HashMap<BaseFont, String>>,
    /// Next font resource number
    next_font_resource: u32,
    /// Embedded images (data hash -> object ID)
    embedded_images: HashMap<u64, ObjectId>,
    /// Page image resources (page number -> resource name -> object ID)
    page_image_resources: HashMap<usize, HashMap<String, ObjectId>>,
    /// Next image resource number
    next_image_resource: u32,
    /// Buffered content operators per page (page number -> operators)
    page_content_buffer: BTreeMap<usize, Vec<u8>>,
}

impl PdfDocument {
    fn from_document(inner: Document) -> Self {
        Self {
            inner,
            embedded_fonts: HashMap::new(),
            page_font_resources: HashMap::new(),
            next_font_resource: 1,
            embedded_images: HashMap::new(),
            page_image_resources: HashMap::new(),
            next_image_resource: 1,
            page_content_buffer: BTreeMap::new(),
        }
    }

    /// Open a PDF document from bytes
    pub fn open_from_bytes(data: &[u8]) -> Result<Self> {
        let inner = Document::load_mem(data).map_err(|e| PdfError::OpenError(e.to_string()))?;
        Ok(Self::from_document(inner))
    }

    /// Get the number of pages in the document
    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    /// Size of a page (1-indexed) in points
    ///
    /// Reads the MediaBox (or CropBox), following the Pages tree for inherited
    /// boxes. Falls back to A4 when no box is present.
    pub fn page_size(&self, page: usize) -> Result<PageSize> {
        let page_id = self.page_id(page)?;
        let media_box = self.get_inherited_media_box(page_id)?;
        extract_size_from_media_box(&media_box)
    }

    /// Width of `text` in points when drawn with `font` at `size`
    pub fn text_width(&self, text: &str, font: BaseFont, size: f32) -> f64 {
        font.text_width_points(text, size)
    }

    /// Insert a single line of text
    ///
    /// # Arguments
    /// * `text` - Text to insert (newlines are not interpreted)
    /// * `page` - Page number (1-indexed)
    /// * `x` - Anchor X coordinate in points; alignment is relative to it
    /// * `y` - Baseline Y coordinate in PDF points (from bottom)
    /// * `style` - Font, size, color and alignment
    pub fn insert_text(
        &mut self,
        text: &str,
        page: usize,
        x: f64,
        y: f64,
        style: &TextStyle,
    ) -> Result<()> {
        self.check_page(page)?;

        if text.is_empty() {
            return Ok(());
        }
        let literal = pdf_literal_string(&encode_win_ansi(text)?);

        let font_resource_name = self.get_or_create_font_ref(style.font, page);

        let ctx = TextRenderContext {
            font_name: font_resource_name,
            font_size: style.size,
            text_width: style.font.text_width_points(text, style.size),
            color: style.color,
        };

        let operators = generate_text_operators(&literal, x, y, style.align, &ctx);
        self.buffer_content(page, &operators);

        Ok(())
    }

    /// Insert an image stretched to a rectangle
    ///
    /// # Arguments
    /// * `data` - Image file bytes (JPEG, PNG, GIF or WebP)
    /// * `page` - Page number (1-indexed)
    /// * `x` - Left edge in points
    /// * `y` - Bottom edge in PDF points (from bottom)
    /// * `width` - Width in points
    /// * `height` - Height in points
    pub fn insert_image(
        &mut self,
        data: &[u8],
        page: usize,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<()> {
        self.check_page(page)?;

        let image_resource_name = self.get_or_create_image_ref(data, page)?;
        let operators = generate_image_operators(&image_resource_name, x, y, width, height);
        self.buffer_content(page, &operators);

        Ok(())
    }

    /// Save the document to bytes
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.finalize()?;

        let mut buffer = Vec::new();
        self.inner
            .save_to(&mut buffer)
            .map_err(|e| PdfError::SaveError(e.to_string()))?;

        Ok(buffer)
    }

    /// Write buffered content and register resources on every touched page
    fn finalize(&mut self) -> Result<()> {
        self.flush_content_buffers()?;
        self.finalize_page_resources()
    }

    fn check_page(&self, page: usize) -> Result<()> {
        let page_count = self.page_count();
        if page == 0 || page > page_count {
            return Err(PdfError::InvalidPage(page, page_count));
        }
        Ok(())
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        let pages = self.inner.get_pages();
        pages
            .get(&(page as u32))
            .copied()
            .ok_or(PdfError::InvalidPage(page, pages.len()))
    }

    /// Get or create a font resource name for a page
    ///
    /// The font object itself is added at save time.
    fn get_or_create_font_ref(&mut self, font: BaseFont, page: usize) -> String {
        let page_resources = self.page_font_resources.entry(page).or_default();

        if let Some(resource_name) = page_resources.get(&font) {
            return resource_name.clone();
        }

        let resource_name = format!("{RESOURCE_PREFIX}F{}", self.next_font_resource);
        self.next_font_resource += 1;
        page_resources.insert(font, resource_name.clone());

        resource_name
    }

    /// Get or create an image resource name for a page
    ///
    /// Images are deduplicated by hash of their bytes, so the same photo used
    /// on several pages is stored once.
    fn get_or_create_image_ref(&mut self, data: &[u8], page: usize) -> Result<String> {
        let mut hasher = DefaultHasher::new();
        data.hash(&mut hasher);
        let data_hash = hasher.finish();

        let object_id = match self.embedded_images.get(&data_hash) {
            Some(id) => *id,
            None => {
                let xobject = ImageXObject::from_bytes(data)?;
                let id = xobject.add_to_document(&mut self.inner);
                self.embedded_images.insert(data_hash, id);
                id
            }
        };

        let page_resources = self.page_image_resources.entry(page).or_default();
        if let Some((name, _)) = page_resources.iter().find(|(_, id)| **id == object_id) {
            return Ok(name.clone());
        }

        let resource_name = format!("{RESOURCE_PREFIX}Im{}", self.next_image_resource);
        self.next_image_resource += 1;
        page_resources.insert(resource_name.clone(), object_id);

        Ok(resource_name)
    }

    /// Add font and image references to the Resources of every touched page
    fn finalize_page_resources(&mut self) -> Result<()> {
        let mut pages: Vec<usize> = self
            .page_font_resources
            .keys()
            .chain(self.page_image_resources.keys())
            .copied()
            .collect();
        pages.sort_unstable();
        pages.dedup();

        for page in pages {
            let fonts: Vec<(BaseFont, String)> = self
                .page_font_resources
                .get(&page)
                .map(|m| m.iter().map(|(f, n)| (*f, n.clone())).collect())
                .unwrap_or_default();
            let mut font_refs = Vec::with_capacity(fonts.len());
            for (font, resource_name) in fonts {
                let id = self.embed_font_object(font);
                font_refs.push((resource_name, id));
            }

            let image_refs: Vec<(String, ObjectId)> = self
                .page_image_resources
                .get(&page)
                .map(|m| m.iter().map(|(n, id)| (n.clone(), *id)).collect())
                .unwrap_or_default();

            self.add_to_page_resources(page, &font_refs, &image_refs)?;
        }

        Ok(())
    }

    /// Add a standard font dictionary once per variant
    fn embed_font_object(&mut self, font: BaseFont) -> ObjectId {
        if let Some(id) = self.embedded_fonts.get(&font) {
            return *id;
        }
        let id = self.inner.add_object(font.to_pdf_dictionary());
        self.embedded_fonts.insert(font, id);
        id
    }

    /// Merge font and XObject entries into a page's Resources dictionary
    ///
    /// Indirect and inherited Resources are resolved first so the template's
    /// own resources survive; the merged dictionary is written on the page.
    fn add_to_page_resources(
        &mut self,
        page: usize,
        fonts: &[(String, ObjectId)],
        images: &[(String, ObjectId)],
    ) -> Result<()> {
        let page_id = self.page_id(page)?;

        let mut resources = self.resolve_page_resources(page_id)?;

        if !fonts.is_empty() {
            let mut font_dict = self.resolve_sub_dictionary(&resources, b"Font")?;
            for (name, id) in fonts {
                font_dict.set(name.as_bytes(), Object::Reference(*id));
            }
            resources.set("Font", Object::Dictionary(font_dict));
        }

        if !images.is_empty() {
            let mut xobject_dict = self.resolve_sub_dictionary(&resources, b"XObject")?;
            for (name, id) in images {
                xobject_dict.set(name.as_bytes(), Object::Reference(*id));
            }
            resources.set("XObject", Object::Dictionary(xobject_dict));
        }

        let mut page_dict = self.page_dictionary(page_id)?;
        page_dict.set("Resources", Object::Dictionary(resources));
        self.inner.objects.insert(page_id, page_dict.into());

        Ok(())
    }

    fn page_dictionary(&self, page_id: ObjectId) -> Result<Dictionary> {
        self.inner
            .get_object(page_id)?
            .as_dict()
            .cloned()
            .map_err(|_| PdfError::ParseError("Page object is not a dictionary".to_string()))
    }

    /// Dereference an object if it is an indirect reference
    fn dereference<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        match object {
            Object::Reference(id) => Ok(self.inner.get_object(*id)?),
            other => Ok(other),
        }
    }

    /// Resources of a page, following the Pages tree for inherited entries
    fn resolve_page_resources(&self, page_id: ObjectId) -> Result<Dictionary> {
        let mut current_id = page_id;

        // Follow parent chain up to 10 levels
        for _ in 0..10 {
            let dict = self
                .inner
                .get_object(current_id)?
                .as_dict()
                .map_err(|_| PdfError::ParseError("Object is not a dictionary".to_string()))?;

            if let Ok(resources) = dict.get(b"Resources") {
                return match self.dereference(resources)? {
                    Object::Dictionary(d) => Ok(d.clone()),
                    _ => Ok(Dictionary::new()),
                };
            }

            match dict.get(b"Parent") {
                Ok(Object::Reference(parent_id)) => current_id = *parent_id,
                _ => break,
            }
        }

        Ok(Dictionary::new())
    }

    fn resolve_sub_dictionary(&self, resources: &Dictionary, key: &[u8]) -> Result<Dictionary> {
        match resources.get(key) {
            Ok(object) => match self.dereference(object)? {
                Object::Dictionary(d) => Ok(d.clone()),
                _ => Ok(Dictionary::new()),
            },
            Err(_) => Ok(Dictionary::new()),
        }
    }

    /// Get MediaBox, following parent inheritance chain if needed
    fn get_inherited_media_box(&self, page_id: ObjectId) -> Result<Vec<Object>> {
        let mut current_id = page_id;

        for _ in 0..10 {
            let dict = self
                .inner
                .get_object(current_id)?
                .as_dict()
                .map_err(|_| PdfError::ParseError("Object is not a dictionary".to_string()))?;

            if let Ok(media_box) = dict.get(b"MediaBox").or_else(|_| dict.get(b"CropBox")) {
                return match self.dereference(media_box)? {
                    Object::Array(arr) => Ok(arr.clone()),
                    _ => Err(PdfError::ParseError("MediaBox is not an array".to_string())),
                };
            }

            match dict.get(b"Parent") {
                Ok(Object::Reference(parent_id)) => current_id = *parent_id,
                _ => break,
            }
        }

        Ok(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::from(A4_WIDTH),
            Object::from(A4_HEIGHT),
        ])
    }

    /// Buffer content operators for a page (written at save time)
    fn buffer_content(&mut self, page: usize, content: &[u8]) {
        self.page_content_buffer
            .entry(page)
            .or_default()
            .extend_from_slice(content);
    }

    /// Flush all buffered content to page streams
    fn flush_content_buffers(&mut self) -> Result<()> {
        let buffers = std::mem::take(&mut self.page_content_buffer);

        for (page, content) in buffers {
            if !content.is_empty() {
                self.append_to_content_stream(page, &content)?;
            }
        }

        Ok(())
    }

    /// Append overlay operators after a page's existing content
    ///
    /// The existing content is wrapped in `q`/`Q` so its graphics state
    /// (transformations, clipping, colors) does not leak into the overlay.
    fn append_to_content_stream(&mut self, page: usize, content: &[u8]) -> Result<()> {
        let page_id = self.page_id(page)?;

        let existing_content = self.inner.get_page_content(page_id).unwrap_or_default();

        let mut new_content = Vec::with_capacity(existing_content.len() + content.len() + 8);
        if !existing_content.is_empty() {
            new_content.extend_from_slice(b"q\n");
            new_content.extend_from_slice(&existing_content);
            new_content.extend_from_slice(b"\nQ\n");
        }
        new_content.extend_from_slice(content);

        let stream_id = self
            .inner
            .add_object(Stream::new(Dictionary::new(), new_content));

        let mut page_dict = self.page_dictionary(page_id)?;
        page_dict.set("Contents", Object::Reference(stream_id));
        self.inner.objects.insert(page_id, page_dict.into());

        Ok(())
    }
}

fn number_value(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Extract width and height from a MediaBox array
fn extract_size_from_media_box(media_box: &[Object]) -> Result<PageSize> {
    if media_box.len() < 4 {
        return Err(PdfError::ParseError("Invalid MediaBox format".to_string()));
    }

    let mut coords = [0.0f64; 4];
    for (slot, object) in coords.iter_mut().zip(media_box) {
        *slot = number_value(object)
            .ok_or_else(|| PdfError::ParseError("Invalid MediaBox value".to_string()))?;
    }
    let [x1, y1, x2, y2] = coords;

    Ok(PageSize {
        width: (x2 - x1).abs(),
        height: (y2 - y1).abs(),
    })
}
