//! Generation pipeline
//!
//! A request moves `received -> validated -> composed -> rasterized ->
//! persisted`. Any failure stops it at that stage, removes the files written
//! so far, and no story record is stored unless every stage succeeds.

use crate::config::AppConfig;
use crate::files::{delete_public_files, remove_if_exists, unique_file_name, unique_id, TempUploads};
use crate::raster::Rasterizer;
use crate::resolver::ImageResolver;
use crate::store::{HistoireStore, TemplateStore};
use crate::validator::{ImageSource, UploadedFiles, ValidationReport, VariableValidator};
use crate::StoryError;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use template::{Histoire, ImageAssets, Template, Variables};
use tracing::{debug, info, warn};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Composed,
    Rasterized,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Composed => "composed",
            Stage::Rasterized => "rasterized",
            Stage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// A request that stopped at `stage`.
#[derive(Debug, thiserror::Error)]
#[error("generation failed at stage {stage}: {error}")]
pub struct GenerationFailure {
    pub stage: Stage,
    #[source]
    pub error: StoryError,
}

impl GenerationFailure {
    pub fn is_not_found(&self) -> bool {
        self.error.is_not_found()
    }

    /// Itemized problems when the request failed validation.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match &self.error {
            StoryError::Validation(report) => Some(report),
            _ => None,
        }
    }
}

fn at<E: Into<StoryError>>(stage: Stage) -> impl FnOnce(E) -> GenerationFailure {
    move |error| GenerationFailure {
        stage,
        error: error.into(),
    }
}

/// Whether the result is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Temp previews only, no story record.
    Preview,
    /// Final PDF and previews plus a stored story.
    Final,
}

/// One generation or preview request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub template_id: String,
    /// Raw variables payload; must be a JSON object.
    pub variables: serde_json::Value,
    /// Files saved by the upload middleware, deleted once the request ends.
    pub uploads: UploadedFiles,
    pub user_id: Option<String>,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub mode: Mode,
    pub pdf_url: String,
    pub preview_urls: Vec<String>,
    /// Stored story (final mode only).
    pub histoire: Option<Histoire>,
    pub rendered: usize,
    pub failed: usize,
    /// One line per element that could not be drawn.
    pub errors: Vec<String>,
    /// Set when previews were skipped because the rasterizer is unavailable.
    pub preview_warning: Option<String>,
}

impl GenerationOutcome {
    /// Every element drawn and previews produced.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.preview_warning.is_none()
    }
}

/// Validates, composes, rasterizes and stores personalized stories.
pub struct StoryService<S> {
    config: AppConfig,
    store: Arc<S>,
    resolver: ImageResolver,
    rasterizer: Rasterizer,
}

impl<S> StoryService<S>
where
    S: TemplateStore + HistoireStore + 'static,
{
    pub fn new(config: AppConfig, store: Arc<S>) -> Self {
        Self {
            resolver: ImageResolver::standard(&config.storage),
            rasterizer: Rasterizer::new(config.render.clone()),
            config,
            store,
        }
    }

    /// Replace the image lookup strategies.
    pub fn with_resolver(mut self, resolver: ImageResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Produce the final PDF and previews and store the story.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        self.run(request, Mode::Final).await
    }

    /// Produce a throwaway PDF and previews in the temp-previews directory.
    pub async fn preview(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        self.run(request, Mode::Preview).await
    }

    /// Delete a story record and every file it owns.
    ///
    /// Only files recorded on the story are removed; URLs the caller passed
    /// in as variables are left alone. Returns the number of files removed.
    pub async fn delete_histoire(&self, id: &str) -> crate::Result<usize> {
        let histoire = self.store.remove_histoire(id).await?;
        let removed = delete_public_files(&self.config.storage, histoire.file_urls()).await;
        remove_empty_dir(&self.story_dir(&histoire.id)).await;

        info!(histoire_id = id, removed, "histoire deleted");
        Ok(removed)
    }

    async fn run(
        &self,
        request: GenerationRequest,
        mode: Mode,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        let _uploads = TempUploads::new(request.uploads.values().cloned());
        let template_id = request.template_id.as_str();
        info!(template_id, ?mode, "generation received");

        let mut variables = match request.variables {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => Variables::new(),
            other => {
                return Err(at(Stage::Received)(StoryError::InvalidPayload(format!(
                    "variables must be a JSON object, got {other}"
                ))))
            }
        };
        let template = self
            .store
            .get_template(template_id)
            .await
            .map_err(at(Stage::Received))?;
        let elements = self
            .store
            .list_elements(template_id)
            .await
            .map_err(at(Stage::Received))?;

        let validation = VariableValidator::new(&self.resolver)
            .validate(&elements, &variables, &request.uploads)
            .await;
        if !validation.report.valid {
            warn!(template_id, report = %validation.report, "validation failed");
            return Err(at(Stage::Validated)(StoryError::Validation(validation.report)));
        }
        let images = Arc::new(load_images(validation.images).await);
        debug!(template_id, images = images.len(), "request validated");

        let template_pdf = tokio::fs::read(self.template_pdf_path(&template))
            .await
            .map_err(at(Stage::Composed))?;
        let page_dimensions = template.page_dimensions;
        let composition = {
            let variables = variables.clone();
            let images = Arc::clone(&images);
            tokio::task::spawn_blocking(move || {
                template::compose(&template_pdf, &elements, &variables, page_dimensions, &images)
            })
            .await
            .map_err(at(Stage::Composed))?
            .map_err(at(Stage::Composed))?
        };

        let storage = &self.config.storage;
        let (pdf_dir, preview_dir, purpose) = match mode {
            Mode::Final => (&storage.pdfs_dir, &storage.previews_dir, "histoire"),
            Mode::Preview => (&storage.temp_previews_dir, &storage.temp_previews_dir, "preview"),
        };
        let pdf_path = pdf_dir.join(unique_file_name(purpose, "pdf"));
        write_file(&pdf_path, &composition.pdf)
            .await
            .map_err(at(Stage::Composed))?;
        let mut written = vec![pdf_path.clone()];
        info!(
            template_id,
            rendered = composition.report.rendered,
            failed = composition.report.failed(),
            "pdf composed"
        );

        let mut preview_warning = None;
        let previews = match self
            .rasterizer
            .to_preview_images(&composition.pdf, preview_dir, "page")
            .await
        {
            Ok(previews) => previews,
            Err(e) if e.is_soft() => {
                warn!(template_id, error = %e, "previews skipped");
                preview_warning = Some(e.to_string());
                Vec::new()
            }
            Err(e) => {
                discard(&written).await;
                return Err(at(Stage::Rasterized)(e));
            }
        };
        written.extend(previews.iter().cloned());

        let pdf_url = self.url_for(&pdf_path);
        let preview_urls: Vec<String> = previews.iter().map(|p| self.url_for(p)).collect();

        let histoire = match mode {
            Mode::Preview => None,
            Mode::Final => {
                let histoire_id = unique_id("histoire");
                let stored = self
                    .persist(
                        &histoire_id,
                        &template,
                        &mut variables,
                        &images,
                        &mut written,
                        request.user_id,
                    )
                    .await
                    .map(|mut histoire| {
                        histoire.preview_urls = preview_urls.clone();
                        histoire.pdf_url = Some(pdf_url.clone());
                        histoire.generated_pdf_url = Some(pdf_url.clone());
                        histoire
                    });
                let stored = match stored {
                    Ok(histoire) => self.store.insert_histoire(histoire).await,
                    Err(e) => Err(e),
                };
                match stored {
                    Ok(histoire) => Some(histoire),
                    Err(e) => {
                        discard(&written).await;
                        remove_empty_dir(&self.story_dir(&histoire_id)).await;
                        return Err(at(Stage::Persisted)(e));
                    }
                }
            }
        };

        info!(
            template_id,
            pdf = %pdf_url,
            previews = preview_urls.len(),
            "generation finished"
        );
        Ok(GenerationOutcome {
            mode,
            pdf_url,
            preview_urls,
            histoire,
            rendered: composition.report.rendered,
            failed: composition.report.failed(),
            errors: composition.report.error_messages(),
            preview_warning,
        })
    }

    /// Copy the request's images into the story's own directory and build
    /// its record.
    ///
    /// Image variables are rewritten to the copies' public URLs so the story
    /// can be regenerated after temp uploads are gone. The copies sit one
    /// level below `histoire-images/`, out of reach of the name-based image
    /// lookup.
    async fn persist(
        &self,
        histoire_id: &str,
        template: &Template,
        variables: &mut Variables,
        images: &ImageAssets,
        written: &mut Vec<PathBuf>,
        user_id: Option<String>,
    ) -> crate::Result<Histoire> {
        let dir = self.story_dir(histoire_id);
        let mut image_urls = Vec::new();
        for (name, data) in images {
            let Ok(data) = data else { continue };
            let ext = pdf_core::detect_format(data)
                .map(|f| f.name())
                .unwrap_or("img");
            let path = dir.join(unique_file_name(name, ext));
            write_file(&path, data).await?;
            written.push(path.clone());

            let url = self.url_for(&path);
            variables.insert(name.clone(), serde_json::Value::String(url.clone()));
            image_urls.push(url);
        }

        Ok(Histoire {
            id: histoire_id.to_string(),
            template_id: template.id.clone(),
            user_id,
            variables: variables.clone(),
            preview_urls: Vec::new(),
            pdf_url: None,
            generated_pdf_url: None,
            image_urls,
            created_at: Utc::now(),
        })
    }

    fn story_dir(&self, histoire_id: &str) -> PathBuf {
        self.config.storage.histoire_images_dir.join(histoire_id)
    }

    /// Template PDF location; public URLs map into the uploads directory.
    fn template_pdf_path(&self, template: &Template) -> PathBuf {
        self.config
            .storage
            .path_for_url(&template.pdf_path)
            .unwrap_or_else(|| PathBuf::from(&template.pdf_path))
    }

    fn url_for(&self, path: &Path) -> String {
        self.config
            .storage
            .public_url(path)
            .unwrap_or_else(|| path.display().to_string())
    }
}

async fn load_images(sources: HashMap<String, ImageSource>) -> ImageAssets {
    let mut images = ImageAssets::new();
    for (name, source) in sources {
        let data = match source {
            ImageSource::Inline(data) => Ok(data),
            ImageSource::File(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| format!("cannot read {}: {e}", path.display())),
        };
        images.insert(name, data);
    }
    images
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await
}

/// Remove a story directory once it is empty; anything else is left as is.
async fn remove_empty_dir(dir: &Path) {
    match tokio::fs::remove_dir(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "story directory removed"),
        Err(e) => debug!(dir = %dir.display(), error = %e, "story directory kept"),
    }
}

/// Best-effort removal of files written by a failed run
async fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = remove_if_exists(path).await {
            warn!(path = %path.display(), error = %e, "failed to discard file");
        }
    }
}
