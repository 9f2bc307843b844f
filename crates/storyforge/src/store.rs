//! Persistence contracts for templates, elements and stories
//!
//! The real database lives elsewhere; the pipeline only needs these traits.
//! [`MemoryStore`] backs tests and the command-line tool.

use crate::files::unique_id;
use crate::{Result, StoryError};
use async_trait::async_trait;
use std::collections::HashMap;
use template::{EditorElement, Histoire, RelativeRect, Template};
use tokio::sync::RwLock;
use tracing::debug;

/// Read/write access to templates and their editor elements.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_template(&self, id: &str) -> Result<Template>;

    async fn list_elements(&self, template_id: &str) -> Result<Vec<EditorElement>>;

    async fn set_template_variables(&self, template_id: &str, variables: Vec<String>) -> Result<()>;

    /// Insert or replace an element; an element without id gets one.
    async fn put_element(&self, element: EditorElement) -> Result<EditorElement>;

    async fn remove_element(&self, template_id: &str, element_id: &str) -> Result<()>;
}

/// Storage of generated stories.
#[async_trait]
pub trait HistoireStore: Send + Sync {
    async fn insert_histoire(&self, histoire: Histoire) -> Result<Histoire>;

    async fn get_histoire(&self, id: &str) -> Result<Histoire>;

    /// Remove a story record and return it.
    async fn remove_histoire(&self, id: &str) -> Result<Histoire>;
}

/// Recompute and store a template's variable list from its elements.
pub async fn refresh_template_variables(
    store: &dyn TemplateStore,
    template_id: &str,
) -> Result<Vec<String>> {
    let elements = store.list_elements(template_id).await?;
    let variables = template::parse_variables_from_elements(&elements);
    store
        .set_template_variables(template_id, variables.clone())
        .await?;
    debug!(template_id, count = variables.len(), "template variables refreshed");
    Ok(variables)
}

/// Create or update an element, keeping the template's variables in sync.
///
/// Coordinates must already be page percentages.
pub async fn save_element(store: &dyn TemplateStore, mut element: EditorElement) -> Result<EditorElement> {
    if !RelativeRect::from(&element).is_relative() {
        return Err(StoryError::InvalidElement(format!(
            "coordinates must be percentages in [0, 100], got x={} y={} width={} height={}",
            element.x, element.y, element.width, element.height
        )));
    }
    store.get_template(&element.template_id).await?;

    element.refresh_variables();
    let saved = store.put_element(element).await?;
    refresh_template_variables(store, &saved.template_id).await?;
    Ok(saved)
}

/// Delete an element, keeping the template's variables in sync.
pub async fn delete_element(store: &dyn TemplateStore, template_id: &str, element_id: &str) -> Result<()> {
    store.remove_element(template_id, element_id).await?;
    refresh_template_variables(store, template_id).await?;
    Ok(())
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    templates: RwLock<HashMap<String, Template>>,
    elements: RwLock<HashMap<String, Vec<EditorElement>>>,
    histoires: RwLock<HashMap<String, Histoire>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template with its elements, assigning missing ids.
    pub async fn insert_template(&self, template: Template, elements: Vec<EditorElement>) -> Template {
        let mut template = template;
        if template.id.is_empty() {
            template.id = unique_id("template");
        }
        let elements = elements
            .into_iter()
            .map(|mut e| {
                e.template_id = template.id.clone();
                e.id.get_or_insert_with(|| unique_id("element"));
                e
            })
            .collect();

        self.elements
            .write()
            .await
            .insert(template.id.clone(), elements);
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template.clone());
        template
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn get_template(&self, id: &str) -> Result<Template> {
        self.templates
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoryError::TemplateNotFound(id.to_string()))
    }

    async fn list_elements(&self, template_id: &str) -> Result<Vec<EditorElement>> {
        self.get_template(template_id).await?;
        Ok(self
            .elements
            .read()
            .await
            .get(template_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_template_variables(&self, template_id: &str, variables: Vec<String>) -> Result<()> {
        let mut templates = self.templates.write().await;
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| StoryError::TemplateNotFound(template_id.to_string()))?;
        template.variables = variables;
        Ok(())
    }

    async fn put_element(&self, mut element: EditorElement) -> Result<EditorElement> {
        self.get_template(&element.template_id).await?;
        let id = element
            .id
            .get_or_insert_with(|| unique_id("element"))
            .clone();

        let mut all = self.elements.write().await;
        let elements = all.entry(element.template_id.clone()).or_default();
        match elements.iter_mut().find(|e| e.id.as_deref() == Some(id.as_str())) {
            Some(existing) => *existing = element.clone(),
            None => elements.push(element.clone()),
        }
        Ok(element)
    }

    async fn remove_element(&self, template_id: &str, element_id: &str) -> Result<()> {
        let mut all = self.elements.write().await;
        let elements = all
            .get_mut(template_id)
            .ok_or_else(|| StoryError::TemplateNotFound(template_id.to_string()))?;
        let before = elements.len();
        elements.retain(|e| e.id.as_deref() != Some(element_id));
        if elements.len() == before {
            return Err(StoryError::ElementNotFound(element_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoireStore for MemoryStore {
    async fn insert_histoire(&self, mut histoire: Histoire) -> Result<Histoire> {
        if histoire.id.is_empty() {
            histoire.id = unique_id("histoire");
        }
        self.histoires
            .write()
            .await
            .insert(histoire.id.clone(), histoire.clone());
        Ok(histoire)
    }

    async fn get_histoire(&self, id: &str) -> Result<Histoire> {
        self.histoires
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoryError::HistoireNotFound(id.to_string()))
    }

    async fn remove_histoire(&self, id: &str) -> Result<Histoire> {
        self.histoires
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StoryError::HistoireNotFound(id.to_string()))
    }
}
