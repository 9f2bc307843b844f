//! Storybook template model types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variable values supplied by the end user, keyed by variable name
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Page size in PDF points, captured from page 1 when the template is uploaded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageDimensions {
    pub width: f64,
    pub height: f64,
}

impl PageDimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both sides are finite and strictly positive
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl From<pdf_core::PageSize> for PageDimensions {
    fn from(size: pdf_core::PageSize) -> Self {
        Self::new(size.width, size.height)
    }
}

/// Story category
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Adventure,
    Fairytale,
    Educational,
    Bedtime,
    Animals,
    #[default]
    Other,
}

/// Who the story is written for
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Boy,
    Girl,
    #[default]
    Unisex,
}

/// Reader age bracket
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgeRange {
    #[serde(rename = "0-3")]
    Toddler,
    #[default]
    #[serde(rename = "3-6")]
    Preschool,
    #[serde(rename = "6-9")]
    Early,
    #[serde(rename = "9-12")]
    Middle,
}

/// Story language
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    En,
    Ar,
}

/// Admin-authored storybook template
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: Category,

    #[serde(default)]
    pub gender: Gender,

    #[serde(default)]
    pub age_range: AgeRange,

    #[serde(default)]
    pub language: Language,

    /// Path to the source PDF
    pub pdf_path: String,

    #[serde(default)]
    pub cover_image: Option<String>,

    #[serde(default)]
    pub page_count: usize,

    /// Dimensions of page 1; element percentages are relative to these
    #[serde(default)]
    pub page_dimensions: Option<PageDimensions>,

    /// Cached variable names, recomputed whenever elements change
    #[serde(default)]
    pub variables: Vec<String>,

    #[serde(default)]
    pub is_published: bool,
}

impl Template {
    /// Recompute the cached variable list from the template's elements
    pub fn refresh_variables(&mut self, elements: &[EditorElement]) {
        self.variables = crate::parser::parse_variables_from_elements(elements);
    }
}

/// Kind of editor element
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    #[default]
    Text,
    Image,
}

/// Text alignment within the element box
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Positioned text or image placeholder on a template page
///
/// `x`, `y`, `width` and `height` are percentages (0-100) of the page size,
/// with the origin at the top-left corner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditorElement {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub template_id: String,

    #[serde(rename = "type")]
    pub kind: ElementKind,

    /// Page index (0-based)
    #[serde(default)]
    pub page: usize,

    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,

    /// Raw text, may embed `(variable)` tokens
    #[serde(default)]
    pub content: Option<String>,

    /// Display-only; PDF output always uses the Helvetica family
    #[serde(default)]
    pub font_family: Option<String>,

    /// Font size in points; absent or zero means auto-fit
    #[serde(default)]
    pub font_size: Option<f32>,

    #[serde(default)]
    pub bold: bool,

    #[serde(default)]
    pub italic: bool,

    /// `#RRGGBB` or `#RGB`
    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub text_align: Align,

    /// Variables referenced by `content`
    #[serde(default)]
    pub variables: Vec<String>,

    /// Image slot rendered by an image element
    #[serde(default)]
    pub variable_name: Option<String>,

    /// Form pre-fill values
    #[serde(default)]
    pub default_values: Option<serde_json::Value>,
}

impl EditorElement {
    pub fn is_image(&self) -> bool {
        self.kind == ElementKind::Image
    }

    /// Recompute `variables` from `content`
    pub fn refresh_variables(&mut self) {
        self.variables = match (self.kind, &self.content) {
            (ElementKind::Text, Some(content)) => crate::parser::detect_placeholders(content),
            _ => Vec::new(),
        };
    }
}

/// A template together with its editor elements
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateDocument {
    pub template: Template,

    #[serde(default)]
    pub elements: Vec<EditorElement>,
}

/// One user's generated story
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Histoire {
    pub id: String,

    pub template_id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    pub variables: Variables,

    #[serde(default)]
    pub preview_urls: Vec<String>,

    #[serde(default)]
    pub pdf_url: Option<String>,

    #[serde(default)]
    pub generated_pdf_url: Option<String>,

    /// Copies of the images this story was generated with
    #[serde(default)]
    pub image_urls: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl Histoire {
    /// Every public URL owned by this story
    pub fn file_urls(&self) -> impl Iterator<Item = &str> {
        self.preview_urls
            .iter()
            .map(String::as_str)
            .chain(self.pdf_url.as_deref())
            .chain(self.generated_pdf_url.as_deref())
            .chain(self.image_urls.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_from_editor_json() {
        let element: EditorElement = serde_json::from_value(json!({
            "type": "text",
            "page": 2,
            "x": 10, "y": 20, "width": 30, "height": 5,
            "content": "Bonjour (nom)",
            "fontFamily": "Comic Neue",
            "fontSize": 18,
            "textAlign": "center",
            "color": "#ff0000"
        }))
        .unwrap();

        assert_eq!(element.kind, ElementKind::Text);
        assert_eq!(element.page, 2);
        assert_eq!(element.font_size, Some(18.0));
        assert_eq!(element.text_align, Align::Center);
        assert_eq!(element.font_family.as_deref(), Some("Comic Neue"));
    }

    #[test]
    fn test_image_element_json() {
        let element: EditorElement = serde_json::from_value(json!({
            "type": "image",
            "x": 0, "y": 0, "width": 50, "height": 50,
            "variableName": "avatar"
        }))
        .unwrap();

        assert!(element.is_image());
        assert_eq!(element.variable_name.as_deref(), Some("avatar"));
    }

    #[test]
    fn test_template_enums() {
        let template: Template = serde_json::from_value(json!({
            "id": "t1",
            "title": "Le voyage",
            "pdfPath": "uploads/t1.pdf",
            "category": "adventure",
            "gender": "girl",
            "ageRange": "6-9",
            "language": "en",
            "pageDimensions": { "width": 595.28, "height": 841.89 }
        }))
        .unwrap();

        assert_eq!(template.category, Category::Adventure);
        assert_eq!(template.gender, Gender::Girl);
        assert_eq!(template.age_range, AgeRange::Early);
        assert_eq!(template.language, Language::En);
        assert!(template.page_dimensions.unwrap().is_usable());
        assert!(!template.is_published);
    }

    #[test]
    fn test_page_dimensions_usable() {
        assert!(PageDimensions::new(10.0, 10.0).is_usable());
        assert!(!PageDimensions::new(0.0, 10.0).is_usable());
        assert!(!PageDimensions::new(f64::NAN, 10.0).is_usable());
    }

    #[test]
    fn test_refresh_element_variables() {
        let mut element = EditorElement {
            content: Some("(prenom) a (age) ans (et un chien)".to_string()),
            ..Default::default()
        };
        element.refresh_variables();
        assert_eq!(element.variables, vec!["prenom", "age"]);
    }

    #[test]
    fn test_histoire_file_urls() {
        let histoire = Histoire {
            id: "h1".to_string(),
            template_id: "t1".to_string(),
            user_id: None,
            variables: Variables::new(),
            preview_urls: vec!["/uploads/previews/a.png".to_string()],
            pdf_url: Some("/uploads/pdfs/a.pdf".to_string()),
            generated_pdf_url: None,
            image_urls: vec!["/uploads/histoire-images/h1/avatar.png".to_string()],
            created_at: Utc::now(),
        };
        let urls: Vec<&str> = histoire.file_urls().collect();
        assert_eq!(
            urls,
            vec![
                "/uploads/previews/a.png",
                "/uploads/pdfs/a.pdf",
                "/uploads/histoire-images/h1/avatar.png"
            ]
        );
    }
}
