//! Template JSON parsing and `(variable)` detection

use crate::{EditorElement, ElementKind, Result, TemplateDocument, TemplateError, Variables};
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Open paren, one or more non-close-paren characters, close paren
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^)]+)\)").unwrap_or_else(|e| panic!("invalid placeholder regex: {e}"))
});

/// Longest accepted variable name, in characters
const MAX_VARIABLE_LEN: usize = 19;

/// Parse a template (with its elements) from a JSON string
pub fn parse_template(json: &str) -> Result<TemplateDocument> {
    serde_json::from_str(json).map_err(|e| TemplateError::ParseError(e.to_string()))
}

/// Every `(...)` token in `text`, in order, duplicates included
///
/// ```
/// use template::parser::detect_variables;
///
/// assert_eq!(detect_variables("(a) et (b) et (a)"), vec!["a", "b", "a"]);
/// ```
pub fn detect_variables(text: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Whether a token looks like a variable name rather than a parenthetical aside
///
/// Accepts 1-19 letters from the Latin script (ASCII plus Latin-1 and
/// Latin Extended-A/B letters). Spaces, hyphens, digits and symbols are
/// rejected.
pub fn is_variable_name(token: &str) -> bool {
    let len = token.chars().count();
    (1..=MAX_VARIABLE_LEN).contains(&len) && token.chars().all(is_latin_letter)
}

fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || (('\u{C0}'..='\u{24F}').contains(&c) && c != '\u{D7}' && c != '\u{F7}')
}

/// Variable names referenced by a text, deduplicated in order of appearance
pub fn detect_placeholders(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    detect_variables(text)
        .into_iter()
        .filter(|token| is_variable_name(token))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// All variable names a template's elements require
///
/// Text elements contribute the placeholders found in their content; image
/// elements contribute their `variableName` verbatim. The result is
/// deduplicated and keeps first-seen order.
pub fn parse_variables_from_elements(elements: &[EditorElement]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut variables = Vec::new();

    for element in elements {
        let names = match element.kind {
            ElementKind::Text => element
                .content
                .as_deref()
                .map(detect_placeholders)
                .unwrap_or_default(),
            ElementKind::Image => element.variable_name.iter().cloned().collect(),
        };

        for name in names {
            if seen.insert(name.clone()) {
                variables.push(name);
            }
        }
    }

    variables
}

/// Replace every `(name)` with the matching variable value
///
/// Tokens with no value (absent or null) are left as literal text so gaps
/// stay visible in previews.
pub fn substitute_variables(text: &str, variables: &Variables) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| {
            match variables.get(&caps[1]).and_then(value_to_string) {
                Some(value) => value,
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Convert a JSON value to text for rendering
///
/// Returns `None` for null, arrays and objects.
pub fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            None
        }
    }
}
