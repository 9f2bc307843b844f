//! Storyforge - personalized storybook generation
//!
//! This crate provides:
//! - Storage layout and render settings ([`config`])
//! - Image variable lookup through ranked strategies ([`resolver`])
//! - Data URI image validation ([`data_uri`])
//! - Variable validation before any PDF is written ([`validator`])
//! - Page rasterization for previews ([`raster`])
//! - File naming, temp-upload cleanup and retention ([`files`])
//! - Template/story persistence contracts ([`store`])
//! - The generation and preview pipeline ([`pipeline`])

pub mod config;
pub mod data_uri;
pub mod files;
pub mod pipeline;
pub mod raster;
pub mod resolver;
pub mod store;
pub mod validator;

pub use config::{AppConfig, ConfigError, RenderConfig, StorageConfig};
pub use data_uri::{decode_data_uri, DataUriError, DataUriImage};
pub use pipeline::{
    GenerationFailure, GenerationOutcome, GenerationRequest, Mode, Stage, StoryService,
};
pub use raster::{RasterError, Rasterizer};
pub use resolver::{
    extract_base_filename, is_image_file, validate_image_exists, ImageCheckError, ImageLookup,
    ImageLookupStrategy, ImageResolver,
};
pub use store::{HistoireStore, MemoryStore, TemplateStore};
pub use validator::{UploadedFiles, ValidationReport, VariableValidator};

use thiserror::Error;

/// Errors that can occur while generating stories
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("histoire not found: {0}")]
    HistoireNotFound(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("invalid element: {0}")]
    InvalidElement(String),

    #[error("invalid variables payload: {0}")]
    InvalidPayload(String),

    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    #[error("template error: {0}")]
    Template(#[from] template::TemplateError),

    #[error("rasterization error: {0}")]
    Raster(#[from] RasterError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoryError {
    /// Missing template, story or element (a 404 for callers)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoryError::TemplateNotFound(_)
                | StoryError::HistoireNotFound(_)
                | StoryError::ElementNotFound(_)
        )
    }
}

/// Result type for story operations
pub type Result<T> = std::result::Result<T, StoryError>;
