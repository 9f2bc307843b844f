//! Pre-generation check of a variable map against a template
//!
//! Runs before any PDF is touched: a request either passes completely or
//! is rejected with every problem listed.

use crate::data_uri::{decode_data_uri, is_data_uri};
use crate::resolver::{validate_image_exists, ImageLookup, ImageResolver, UPLOAD_FIELD_PREFIX};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use template::{parse_variables_from_elements, EditorElement, Variables};

/// Upload field name to saved file path, as delivered by the upload middleware.
pub type UploadedFiles = BTreeMap<String, PathBuf>;

/// A problem with one image variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageIssue {
    pub variable: String,
    pub error: String,
}

/// Itemized validation outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_variables: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image_errors: Vec<ImageIssue>,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            return write!(f, "all variables valid");
        }
        let mut parts = Vec::new();
        if !self.missing_variables.is_empty() {
            parts.push(format!("missing variables: {}", self.missing_variables.join(", ")));
        }
        if !self.missing_images.is_empty() {
            parts.push(format!("missing images: {}", self.missing_images.join(", ")));
        }
        for issue in &self.image_errors {
            parts.push(format!("{}: {}", issue.variable, issue.error));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Where a validated image's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Inline(Vec<u8>),
}

/// Report plus the sources of every image that passed.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub report: ValidationReport,
    pub images: HashMap<String, ImageSource>,
}

/// Null, empty string, `false` and `0`
fn is_falsy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => false,
    }
}

/// Checks variable maps using an [`ImageResolver`] for file-backed images.
pub struct VariableValidator<'a> {
    resolver: &'a ImageResolver,
}

impl<'a> VariableValidator<'a> {
    pub fn new(resolver: &'a ImageResolver) -> Self {
        Self { resolver }
    }

    /// Validate `variables` (and uploaded files) against a template's elements.
    ///
    /// Image variables come from image elements; every other referenced
    /// variable must be present and non-null. An image variable with no
    /// value falls back to the `images_<variable>` upload field.
    pub async fn validate(
        &self,
        elements: &[EditorElement],
        variables: &Variables,
        uploads: &UploadedFiles,
    ) -> Validation {
        let image_variables: HashSet<&str> = elements
            .iter()
            .filter(|e| e.is_image())
            .filter_map(|e| e.variable_name.as_deref())
            .collect();
        let uploaded_paths: Vec<PathBuf> = uploads.values().cloned().collect();

        let mut validation = Validation::default();
        let report = &mut validation.report;

        for name in parse_variables_from_elements(elements) {
            if !image_variables.contains(name.as_str()) {
                if variables.get(&name).map_or(true, serde_json::Value::is_null) {
                    report.missing_variables.push(name);
                }
                continue;
            }

            let upload_field = format!("{UPLOAD_FIELD_PREFIX}{name}");
            let value = match variables.get(&name) {
                Some(v) if !is_falsy(v) => v.clone(),
                _ => match uploads.get(&upload_field) {
                    Some(path) => serde_json::Value::String(path.to_string_lossy().into_owned()),
                    None => {
                        report.missing_images.push(name);
                        continue;
                    }
                },
            };

            let Some(value) = value.as_str() else {
                report.image_errors.push(ImageIssue {
                    variable: name,
                    error: "image value must be a string".into(),
                });
                continue;
            };

            match self.check_image(&name, value, &uploaded_paths).await {
                Ok(source) => {
                    validation.images.insert(name, source);
                }
                Err(error) => report.image_errors.push(ImageIssue {
                    variable: name,
                    error,
                }),
            }
        }

        report.valid = report.missing_variables.is_empty()
            && report.missing_images.is_empty()
            && report.image_errors.is_empty();
        validation
    }

    async fn check_image(
        &self,
        variable: &str,
        value: &str,
        uploaded: &[PathBuf],
    ) -> Result<ImageSource, String> {
        if is_data_uri(value) {
            return decode_data_uri(value)
                .map(|image| ImageSource::Inline(image.data))
                .map_err(|e| e.to_string());
        }

        match self.resolver.find_image(variable, value, uploaded).await {
            ImageLookup::Found { path, .. } => {
                validate_image_exists(&path).await.map_err(|e| e.to_string())?;
                Ok(ImageSource::File(path))
            }
            ImageLookup::NotFound { error } => Err(error),
        }
    }
}
